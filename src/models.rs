use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ELIGIBLE: &str = "eligible";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

/// The three exam phases a docket can be issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamType {
    Ca1,
    Ca2,
    Exam,
}

impl ExamType {
    pub const ALL: [ExamType; 3] = [ExamType::Ca1, ExamType::Ca2, ExamType::Exam];

    pub fn as_str(self) -> &'static str {
        match self {
            ExamType::Ca1 => "ca1",
            ExamType::Ca2 => "ca2",
            ExamType::Exam => "exam",
        }
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ca1" => Ok(ExamType::Ca1),
            "ca2" => Ok(ExamType::Ca2),
            "exam" => Ok(ExamType::Exam),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudentAccount {
    pub id: Uuid,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminAccount {
    pub id: Uuid,
    pub username: String,
    pub password_hash: Option<String>,
}

/// Per-student clearance status for the three exam phases.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Clearance {
    pub ca1_status: String,
    pub ca2_status: String,
    pub exam_status: String,
}

impl Clearance {
    pub fn status_for(&self, exam_type: ExamType) -> &str {
        match exam_type {
            ExamType::Ca1 => &self.ca1_status,
            ExamType::Ca2 => &self.ca2_status,
            ExamType::Exam => &self.exam_status,
        }
    }

    pub fn eligible_for(&self, exam_type: ExamType) -> bool {
        self.status_for(exam_type) == ELIGIBLE
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StudentProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub student_number: String,
    pub programme_id: Uuid,
    pub programme_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenKey {
    pub id: Uuid,
    pub key_value: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub student_number: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StudentSummary {
    pub id: Uuid,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub balance: f64,
}

/// Singleton admin document naming the exam phase currently open for
/// docket requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSettings {
    pub active_exam: ExamType,
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            active_exam: ExamType::Ca1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_type_parses_known_phases() {
        assert_eq!("ca1".parse(), Ok(ExamType::Ca1));
        assert_eq!("ca2".parse(), Ok(ExamType::Ca2));
        assert_eq!("exam".parse(), Ok(ExamType::Exam));
        assert_eq!("finals".parse::<ExamType>(), Err(()));
        assert_eq!("CA1".parse::<ExamType>(), Err(()));
    }

    #[test]
    fn exam_type_display_round_trips() {
        for exam_type in ExamType::ALL {
            assert_eq!(exam_type.to_string().parse(), Ok(exam_type));
        }
    }

    #[test]
    fn exam_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ExamType::Exam).unwrap(),
            serde_json::json!("exam")
        );
    }

    #[test]
    fn eligibility_is_a_pure_function_of_status() {
        let clearance = Clearance {
            ca1_status: "eligible".to_string(),
            ca2_status: "not-eligible".to_string(),
            exam_status: "pending".to_string(),
        };
        assert!(clearance.eligible_for(ExamType::Ca1));
        assert!(!clearance.eligible_for(ExamType::Ca2));
        assert!(!clearance.eligible_for(ExamType::Exam));
    }

    #[test]
    fn default_settings_open_ca1() {
        assert_eq!(ExamSettings::default().active_exam, ExamType::Ca1);
    }
}
