use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::dockets::token_digest;
use crate::err::{reply, Error, Payload};
use crate::models::{ExamType, TokenKey};

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    qr_payload: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedStudent {
    pub first_name: String,
    pub last_name: String,
    pub student_number: String,
    pub programme_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedReply {
    pub exam_type: String,
    pub student: VerifiedStudent,
    pub status: &'static str,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DocketHolder {
    docket_id: Uuid,
    exam_type: String,
    first_name: String,
    last_name: String,
    student_number: String,
    programme_name: String,
}

/// Parses `{student_number}_{exam_type}_{token}` from the right: tokens
/// are hex and exam types come from a closed set, so neither can contain
/// the delimiter, while student numbers may.
pub fn parse_qr_payload(payload: &str) -> Option<(String, ExamType, String)> {
    let mut parts = payload.rsplitn(3, '_');
    let token = parts.next()?;
    let exam = parts.next()?;
    let student_number = parts.next()?;
    if token.is_empty() || student_number.is_empty() {
        return None;
    }
    let exam_type = exam.parse().ok()?;
    Some((student_number.to_string(), exam_type, token.to_string()))
}

/// Redeems a docket token. The conditional status flip under a row lock
/// makes redemption succeed at most once per token.
pub async fn verify_docket(
    Extension(pg): Extension<PgPool>,
    payload: Option<Json<VerifyRequest>>,
) -> Payload<VerifiedReply> {
    let Json(request) = payload.ok_or_else(|| Error::validation("Missing parameters"))?;
    let (student_number, exam_type, token_value) = parse_qr_payload(&request.qr_payload)
        .ok_or_else(|| Error::validation("Malformed QR payload"))?;

    let key = sqlx::query_as::<_, TokenKey>(
        "SELECT id, key_value FROM token_keys WHERE status = 'active' LIMIT 1",
    )
    .fetch_optional(&pg)
    .await?
    .ok_or_else(|| Error::not_found("Token already used or invalid."))?;
    let token_hash = token_digest(&key.key_value, &token_value);

    let mut tx = pg.begin().await?;
    let holder = sqlx::query_as::<_, DocketHolder>(
        "SELECT dt.docket_id, d.exam_type, s.first_name, s.last_name, s.student_number, p.programme_name \
         FROM docket_tokens dt \
         JOIN dockets d ON dt.docket_id = d.id \
         JOIN students s ON d.student_id = s.id \
         JOIN programmes p ON s.programme_id = p.programme_id \
         WHERE dt.token_hash = $1 AND dt.status = 'active' \
         FOR UPDATE OF dt",
    )
    .bind(&token_hash)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::not_found("Token already used or invalid."))?;

    if holder.student_number != student_number || holder.exam_type != exam_type.as_str() {
        return Err(Error::forbidden("QR payload does not match the issued docket."));
    }

    let updated = sqlx::query(
        "UPDATE docket_tokens SET status = 'used' WHERE docket_id = $1 AND status = 'active'",
    )
    .bind(holder.docket_id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(Error::not_found("Token already used or invalid."));
    }

    sqlx::query("UPDATE dockets SET status = 'consumed', updated_at = $2 WHERE id = $1")
        .bind(holder.docket_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    reply(VerifiedReply {
        exam_type: holder.exam_type,
        student: VerifiedStudent {
            first_name: holder.first_name,
            last_name: holder.last_name,
            student_number: holder.student_number,
            programme_name: holder.programme_name,
        },
        status: "consumed",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dockets::{new_token_value, qr_payload};

    #[test]
    fn payload_round_trips() {
        let token = new_token_value();
        let payload = qr_payload("CU-2021-014", ExamType::Ca1, &token);
        let (student_number, exam_type, parsed_token) = parse_qr_payload(&payload).unwrap();
        assert_eq!(student_number, "CU-2021-014");
        assert_eq!(exam_type, ExamType::Ca1);
        assert_eq!(parsed_token, token);
    }

    #[test]
    fn student_numbers_may_contain_the_delimiter() {
        let payload = qr_payload("CU_2021_014", ExamType::Exam, "abcdef");
        let (student_number, exam_type, token) = parse_qr_payload(&payload).unwrap();
        assert_eq!(student_number, "CU_2021_014");
        assert_eq!(exam_type, ExamType::Exam);
        assert_eq!(token, "abcdef");
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(parse_qr_payload("").is_none());
        assert!(parse_qr_payload("justonefield").is_none());
        assert!(parse_qr_payload("two_fields").is_none());
        assert!(parse_qr_payload("CU-2021-014_finals_abcdef").is_none());
        assert!(parse_qr_payload("_ca1_abcdef").is_none());
        assert!(parse_qr_payload("CU-2021-014_ca1_").is_none());
    }
}
