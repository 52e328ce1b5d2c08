use std::sync::Arc;

use axum::async_trait;
use axum::extract::{Extension, FromRequest, RequestParts};
use axum::headers::authorization::Bearer;
use axum::headers::{Authorization, Cookie};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::{Json, TypedHeader};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::err::{reply, Error, Payload, Reply};
use crate::models::{AdminAccount, Role, StudentAccount};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

pub fn hash_password(plain: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Pbkdf2
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| {
            log::error!("Password hashing failed: {}", err);
            Error::persistence("Could not hash password")
        })
}

/// The digest is a self-describing PHC string; anything unparseable
/// counts as a mismatch.
pub fn verify_password(plain: &str, digest: &str) -> bool {
    match PasswordHash::new(digest) {
        Ok(parsed) => Pbkdf2.verify_password(plain.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(
    secret: &str,
    subject: Uuid,
    role: Role,
    ttl_seconds: i64,
) -> Result<String, Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        role,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| {
        log::error!("Token signing failed: {}", err);
        Error::persistence("Could not issue token")
    })
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            Error::authentication("Token expired")
        }
        _ => Error::authentication("Invalid token"),
    })
}

/// Header takes precedence over the cookie.
pub fn bearer_or_cookie(bearer: Option<&str>, cookie: Option<&str>) -> Option<String> {
    bearer.or(cookie).map(str::to_owned)
}

/// Decoded session identity, extracted from the `Authorization: Bearer`
/// header or the `access_token` cookie. Rejections carry the crate error
/// envelope, so guarding a handler is just taking this as an argument.
#[derive(Debug, Clone)]
pub struct Session(pub Claims);

impl Session {
    pub fn require_role(&self, role: Role) -> Result<(), Error> {
        if self.0.role == role {
            Ok(())
        } else {
            Err(Error::forbidden("Forbidden"))
        }
    }
}

#[async_trait]
impl<B> FromRequest<B> for Session
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(cfg) = Extension::<Arc<Config>>::from_request(req)
            .await
            .map_err(|_| Error::persistence("Server configuration missing"))?;

        let bearer = TypedHeader::<Authorization<Bearer>>::from_request(req)
            .await
            .ok();
        let cookie = TypedHeader::<Cookie>::from_request(req).await.ok();

        let token = bearer_or_cookie(
            bearer.as_ref().map(|TypedHeader(auth)| auth.token()),
            cookie
                .as_ref()
                .and_then(|TypedHeader(jar)| jar.get(ACCESS_TOKEN_COOKIE)),
        )
        .ok_or_else(|| Error::authentication("Missing token"))?;

        let claims = validate_token(&cfg.jwt_secret, &token)?;
        Ok(Session(claims))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    student_number: Option<String>,
    username: Option<String>,
    password: Option<String>,
    #[serde(default)]
    role: Role,
    #[serde(default)]
    use_cookie: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginUser {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginReply {
    pub token: String,
    pub user: LoginUser,
}

pub async fn login(
    Extension(pg): Extension<PgPool>,
    Extension(cfg): Extension<Arc<Config>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, Error> {
    let Json(login) = payload.ok_or_else(|| Error::validation("Missing credentials"))?;
    let identifier = login
        .student_number
        .or(login.username)
        .unwrap_or_default();
    let password = login.password.unwrap_or_default();
    if identifier.is_empty() || password.is_empty() {
        return Err(Error::validation("Missing credentials"));
    }

    let (subject, digest, user) = match login.role {
        Role::Admin => {
            let admin = sqlx::query_as::<_, AdminAccount>(
                "SELECT id, username, password_hash FROM admins WHERE username = $1 LIMIT 1",
            )
            .bind(&identifier)
            .fetch_optional(&pg)
            .await?;
            match admin {
                Some(admin) => (
                    admin.id,
                    admin.password_hash,
                    LoginUser {
                        id: admin.id,
                        first_name: None,
                        last_name: None,
                        role: Role::Admin,
                    },
                ),
                None => return Err(Error::authentication("Invalid credentials")),
            }
        }
        Role::Student => {
            let student = sqlx::query_as::<_, StudentAccount>(
                "SELECT id, student_number, first_name, last_name, password_hash \
                 FROM students WHERE student_number = $1 LIMIT 1",
            )
            .bind(&identifier)
            .fetch_optional(&pg)
            .await?;
            match student {
                Some(student) => (
                    student.id,
                    student.password_hash,
                    LoginUser {
                        id: student.id,
                        first_name: Some(student.first_name),
                        last_name: Some(student.last_name),
                        role: Role::Student,
                    },
                ),
                None => return Err(Error::authentication("Invalid credentials")),
            }
        }
    };

    let digest = digest.ok_or_else(|| Error::authentication("Invalid credentials"))?;
    if !verify_password(&password, &digest) {
        return Err(Error::authentication("Invalid credentials"));
    }

    let token = issue_token(&cfg.jwt_secret, subject, login.role, cfg.jwt_exp_seconds)?;
    let mut res = Json(Reply::of(LoginReply {
        token: token.clone(),
        user,
    }))
    .into_response();

    if login.use_cookie {
        let cookie = format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/",
            ACCESS_TOKEN_COOKIE, token
        );
        let value = HeaderValue::from_str(&cookie)
            .map_err(|_| Error::persistence("Could not set session cookie"))?;
        res.headers_mut().insert(SET_COOKIE, value);
    }
    Ok(res)
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedOut {}

pub async fn logout(_session: Session) -> Response {
    let mut res = Json(Reply::of(LoggedOut {})).into_response();
    res.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_static("access_token=; Max-Age=0; HttpOnly; SameSite=Lax; Path=/"),
    );
    res
}

#[derive(Debug, Clone, Serialize)]
pub struct MeReply {
    pub user: Claims,
}

pub async fn me(Session(claims): Session) -> Payload<MeReply> {
    reply(MeReply { user: claims })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let digest = hash_password("correct horse").unwrap();
        assert_ne!(digest, "correct horse");
        assert!(verify_password("correct horse", &digest));
        assert!(!verify_password("wrong horse", &digest));
    }

    #[test]
    fn unparseable_digest_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn token_round_trip() {
        let subject = Uuid::new_v4();
        let token = issue_token("secret", subject, Role::Admin, 3600).unwrap();
        let claims = validate_token("secret", &token).unwrap();
        assert_eq!(claims.sub, subject.to_string());
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token("secret", Uuid::new_v4(), Role::Student, -30).unwrap();
        let err = validate_token("secret", &token).unwrap_err();
        assert_eq!(err.message(), "Token expired");
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let token = issue_token("secret", Uuid::new_v4(), Role::Student, 3600).unwrap();
        let err = validate_token("other-secret", &token).unwrap_err();
        assert_eq!(err.message(), "Invalid token");
    }

    #[test]
    fn header_takes_precedence_over_cookie() {
        assert_eq!(
            bearer_or_cookie(Some("from-header"), Some("from-cookie")).as_deref(),
            Some("from-header")
        );
        assert_eq!(
            bearer_or_cookie(None, Some("from-cookie")).as_deref(),
            Some("from-cookie")
        );
        assert_eq!(bearer_or_cookie(None, None), None);
    }
}
