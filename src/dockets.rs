use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::auth::Session;
use crate::config::Config;
use crate::err::{reply, Error, Payload};
use crate::io::DocumentStore;
use crate::models::{
    Clearance, ExamType, PaymentRecord, Role, StudentProfile, StudentSummary, TokenKey,
};
use crate::pdf;

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityEntry {
    pub exam_type: ExamType,
    pub eligible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReply {
    pub eligibility: Vec<EligibilityEntry>,
}

pub async fn check_eligibility(
    Path(student_id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<EligibilityReply> {
    let clearance = fetch_clearance(&pg, student_id)
        .await?
        .ok_or_else(|| Error::not_found("No clearance records found."))?;

    let eligibility = ExamType::ALL
        .iter()
        .map(|&exam_type| EligibilityEntry {
            exam_type,
            eligible: clearance.eligible_for(exam_type),
        })
        .collect();
    reply(EligibilityReply { eligibility })
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    student_id: Uuid,
    exam_type: String,
}

pub async fn generate_docket(
    Extension(pg): Extension<PgPool>,
    Extension(cfg): Extension<Arc<Config>>,
    Extension(docs): Extension<Arc<DocumentStore>>,
    payload: Option<Json<GenerateRequest>>,
) -> Result<Response, Error> {
    let Json(request) = payload.ok_or_else(|| Error::validation("Missing parameters"))?;
    let exam_type: ExamType = request
        .exam_type
        .parse()
        .map_err(|_| Error::validation("Invalid exam type specified."))?;

    let clearance = fetch_clearance(&pg, request.student_id)
        .await?
        .ok_or_else(|| Error::not_found("No clearance record found."))?;
    if !clearance.eligible_for(exam_type) {
        return Err(Error::forbidden(format!(
            "Not eligible for {} docket. Please visit the Retentions Office.",
            exam_type.as_str().to_uppercase()
        )));
    }

    let student = sqlx::query_as::<_, StudentProfile>(
        "SELECT s.id, s.first_name, s.last_name, s.student_number, s.programme_id, p.programme_name \
         FROM students s JOIN programmes p ON s.programme_id = p.programme_id \
         WHERE s.id = $1 LIMIT 1",
    )
    .bind(request.student_id)
    .fetch_optional(&pg)
    .await?
    .ok_or_else(|| Error::not_found("Student not found."))?;

    let courses: Vec<String> = sqlx::query_scalar(
        "SELECT c.course_name FROM enrollments e \
         JOIN curriculum cu ON e.curriculum_id = cu.curriculum_id \
         JOIN courses c ON cu.course_id = c.course_id \
         WHERE e.student_id = $1 ORDER BY c.course_name ASC",
    )
    .bind(request.student_id)
    .fetch_all(&pg)
    .await?;
    if courses.is_empty() {
        return Err(Error::not_found("No enrolled courses found."));
    }

    let blocklist = docs.load_blocklist().await;
    if blocklist.iter().any(|number| number == &student.student_number) {
        return Err(Error::forbidden("Student is blocked from docket issuance."));
    }

    let token_value = new_token_value();

    let mut tx = pg.begin().await?;
    let key = active_token_key(&mut tx).await?;
    let token_hash = token_digest(&key.key_value, &token_value);
    let payload_text = qr_payload(&student.student_number, exam_type, &token_value);

    let now = Utc::now();
    let docket_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO dockets \
         (id, student_id, programme_id, exam_type, qr_payload, issued_at, status, print_count, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, 'issued', 1, $6, $6)",
    )
    .bind(docket_id)
    .bind(student.id)
    .bind(student.programme_id)
    .bind(exam_type.as_str())
    .bind(&payload_text)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO docket_tokens (id, docket_id, token_hash, issued_at, status) \
         VALUES ($1, $2, $3, $4, 'active')",
    )
    .bind(Uuid::new_v4())
    .bind(docket_id)
    .bind(&token_hash)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // Rendering happens before commit; a failure rolls the docket/token
    // pair back.
    let pdf_bytes = match pdf::render_docket(
        &cfg.institution_name,
        &student,
        &courses,
        exam_type,
        &payload_text,
    ) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("Docket rendering failed: {}", err);
            tx.rollback().await.ok();
            return Err(Error::persistence("Could not render docket"));
        }
    };
    tx.commit().await?;

    let filename = format!("{}_{}_Docket.pdf", student.student_number, exam_type);
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|_| Error::persistence("Could not build download headers"))?;

    let mut res = pdf_bytes.into_response();
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    res.headers_mut().insert(CONTENT_DISPOSITION, disposition);
    Ok(res)
}

async fn fetch_clearance(pg: &PgPool, student_id: Uuid) -> Result<Option<Clearance>, Error> {
    sqlx::query_as::<_, Clearance>(
        "SELECT ca1_status, ca2_status, exam_status FROM clearances \
         WHERE student_id = $1 LIMIT 1",
    )
    .bind(student_id)
    .fetch_optional(pg)
    .await
    .map_err(Error::from)
}

/// Returns the single active signing key, creating one inside the caller's
/// transaction on first use. The row lock serializes concurrent issuers.
async fn active_token_key(tx: &mut Transaction<'_, Postgres>) -> Result<TokenKey, Error> {
    let existing = sqlx::query_as::<_, TokenKey>(
        "SELECT id, key_value FROM token_keys WHERE status = 'active' LIMIT 1 FOR UPDATE",
    )
    .fetch_optional(&mut *tx)
    .await?;
    if let Some(key) = existing {
        return Ok(key);
    }

    let key = TokenKey {
        id: Uuid::new_v4(),
        key_value: new_key_value(),
    };
    sqlx::query(
        "INSERT INTO token_keys (id, key_value, status, created_at) \
         VALUES ($1, $2, 'active', $3)",
    )
    .bind(key.id)
    .bind(&key.key_value)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    Ok(key)
}

/// 24 random bytes, hex-encoded; URL- and QR-safe.
pub fn new_token_value() -> String {
    let bytes: [u8; 24] = thread_rng().gen();
    hex::encode(bytes)
}

fn new_key_value() -> String {
    let bytes: [u8; 32] = thread_rng().gen();
    hex::encode(bytes)
}

/// The store only ever sees this digest, never the token itself.
pub fn token_digest(key_value: &str, token_value: &str) -> String {
    let mut hasher: Sha256 = Digest::new();
    hasher.update(key_value.as_bytes());
    hasher.update(token_value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Token and exam type cannot contain `_`, so parsing from the right is
/// unambiguous even for student numbers that do.
pub fn qr_payload(student_number: &str, exam_type: ExamType, token_value: &str) -> String {
    format!("{}_{}_{}", student_number, exam_type, token_value)
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentsReply {
    pub payments: Vec<PaymentRecord>,
}

pub async fn list_payments(
    session: Session,
    Extension(pg): Extension<PgPool>,
) -> Payload<PaymentsReply> {
    session.require_role(Role::Admin)?;

    let payments = sqlx::query_as::<_, PaymentRecord>(
        "SELECT p.id, s.student_number, p.amount, p.created_at FROM payments p \
         JOIN students s ON p.student_id = s.id \
         ORDER BY p.created_at DESC LIMIT 100",
    )
    .fetch_all(&pg)
    .await?;
    reply(PaymentsReply { payments })
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentsReply {
    pub students: Vec<StudentSummary>,
}

pub async fn search_students(
    session: Session,
    Query(params): Query<SearchParams>,
    Extension(pg): Extension<PgPool>,
) -> Payload<StudentsReply> {
    session.require_role(Role::Admin)?;

    let needle = params.q.trim();
    if needle.is_empty() {
        return Err(Error::validation("Missing search query"));
    }
    let pattern = format!("%{}%", needle);

    let students = sqlx::query_as::<_, StudentSummary>(
        "SELECT id, student_number, first_name, last_name, balance FROM students \
         WHERE student_number ILIKE $1 OR first_name ILIKE $1 OR last_name ILIKE $1 \
         ORDER BY student_number ASC LIMIT 25",
    )
    .bind(&pattern)
    .fetch_all(&pg)
    .await?;
    reply(StudentsReply { students })
}

#[derive(Debug, Deserialize)]
pub struct PaymentUpdate {
    student_id: Uuid,
    amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceReply {
    pub balance: f64,
}

pub async fn update_payment(
    session: Session,
    Extension(pg): Extension<PgPool>,
    payload: Option<Json<PaymentUpdate>>,
) -> Payload<BalanceReply> {
    session.require_role(Role::Admin)?;
    let Json(update) = payload.ok_or_else(|| Error::validation("Missing parameters"))?;
    if !update.amount.is_finite() || update.amount <= 0.0 {
        return Err(Error::validation("Payment amount must be positive"));
    }

    let mut tx = pg.begin().await?;
    let balance: Option<f64> =
        sqlx::query_scalar("SELECT balance FROM students WHERE id = $1 FOR UPDATE")
            .bind(update.student_id)
            .fetch_optional(&mut *tx)
            .await?;
    let balance = balance.ok_or_else(|| Error::not_found("Student not found."))?;

    sqlx::query("INSERT INTO payments (id, student_id, amount, created_at) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(update.student_id)
        .bind(update.amount)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE students SET balance = balance + $2 WHERE id = $1")
        .bind(update.student_id)
        .bind(update.amount)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    reply(BalanceReply {
        balance: balance + update.amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_values_are_long_random_hex() {
        let a = new_token_value();
        let b = new_token_value();
        assert_eq!(a.len(), 48);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_one_way_and_reproducible() {
        let token = new_token_value();
        let digest = token_digest("key", &token);
        assert_ne!(digest, token);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, token_digest("key", &token));
        assert_ne!(digest, token_digest("other-key", &token));
    }

    #[test]
    fn qr_payload_joins_fields_with_underscores() {
        assert_eq!(
            qr_payload("CU-2021-014", ExamType::Ca2, "abc123"),
            "CU-2021-014_ca2_abc123"
        );
    }
}
