use std::sync::Arc;

use axum::extract::Path;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::Session;
use crate::err::{reply, Error, Payload};
use crate::io::DocumentStore;
use crate::models::{ExamSettings, ExamType, Role};

#[derive(Debug, Clone, Serialize)]
pub struct SettingsReply {
    pub settings: ExamSettings,
}

pub async fn get_settings(
    session: Session,
    Extension(docs): Extension<Arc<DocumentStore>>,
) -> Payload<SettingsReply> {
    session.require_role(Role::Admin)?;
    reply(SettingsReply {
        settings: docs.load_settings().await,
    })
}

#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    active_exam: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageReply {
    pub message: String,
}

pub async fn update_settings(
    session: Session,
    Extension(docs): Extension<Arc<DocumentStore>>,
    payload: Option<Json<SettingsUpdate>>,
) -> Payload<MessageReply> {
    session.require_role(Role::Admin)?;
    let Json(update) = payload.ok_or_else(|| Error::validation("Missing parameters"))?;
    let active_exam: ExamType = update
        .active_exam
        .parse()
        .map_err(|_| Error::validation("Invalid exam type specified."))?;

    docs.save_settings(&ExamSettings { active_exam }).await?;
    reply(MessageReply {
        message: format!("Active exam set to {}.", active_exam),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct BlocklistReply {
    pub blocked_students: Vec<String>,
}

pub async fn get_blocked_students(
    session: Session,
    Extension(docs): Extension<Arc<DocumentStore>>,
) -> Payload<BlocklistReply> {
    session.require_role(Role::Admin)?;
    reply(BlocklistReply {
        blocked_students: docs.load_blocklist().await,
    })
}

pub async fn block_student(
    session: Session,
    Path(student_number): Path<String>,
    Extension(docs): Extension<Arc<DocumentStore>>,
) -> Payload<MessageReply> {
    session.require_role(Role::Admin)?;

    let mut blocklist = docs.load_blocklist().await;
    if insert_unique(&mut blocklist, &student_number) {
        docs.save_blocklist(&blocklist).await?;
    }
    reply(MessageReply {
        message: format!("Student {} has been blocked.", student_number),
    })
}

pub async fn unblock_student(
    session: Session,
    Path(student_number): Path<String>,
    Extension(docs): Extension<Arc<DocumentStore>>,
) -> Payload<MessageReply> {
    session.require_role(Role::Admin)?;

    let mut blocklist = docs.load_blocklist().await;
    if remove_member(&mut blocklist, &student_number) {
        docs.save_blocklist(&blocklist).await?;
    }
    reply(MessageReply {
        message: format!("Student {} has been unblocked.", student_number),
    })
}

fn insert_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|member| member == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

fn remove_member(list: &mut Vec<String>, value: &str) -> bool {
    let before = list.len();
    list.retain(|member| member != value);
    list.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_is_idempotent() {
        let mut list = Vec::new();
        assert!(insert_unique(&mut list, "CU-2021-001"));
        assert!(!insert_unique(&mut list, "CU-2021-001"));
        assert_eq!(list, vec!["CU-2021-001".to_string()]);
    }

    #[test]
    fn unblocking_a_non_member_is_a_no_op() {
        let mut list = vec!["CU-2021-001".to_string()];
        assert!(!remove_member(&mut list, "CU-2021-002"));
        assert_eq!(list.len(), 1);
        assert!(remove_member(&mut list, "CU-2021-001"));
        assert!(list.is_empty());
        assert!(!remove_member(&mut list, "CU-2021-001"));
    }

    #[test]
    fn settings_reject_unknown_phases() {
        assert!("midterm".parse::<ExamType>().is_err());
        assert!("exam".parse::<ExamType>().is_ok());
    }
}
