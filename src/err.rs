use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

/// Handler result carrying the uniform `{"ok": true, ...}` envelope.
pub type Payload<T> = Result<Json<Reply<T>>, Error>;

pub fn reply<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Reply::of(value)))
}

pub async fn handler404(path: Uri) -> Error {
    Error::not_found(format!("Invalid path: {}", path))
}

#[derive(Debug, Clone, Serialize)]
pub struct Reply<V> {
    ok: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Reply<V> {
    pub fn of(value: V) -> Self {
        Self { ok: true, value }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug, Clone)]
pub enum Error {
    Validation { message: String },
    Authentication { message: String },
    Forbidden { message: String },
    NotFound { message: String },
    Persistence { message: String },
}

impl Error {
    pub fn validation<S: Into<String>>(message: S) -> Error {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn authentication<S: Into<String>>(message: S) -> Error {
        Error::Authentication {
            message: message.into(),
        }
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Error {
        Error::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Error {
        Error::NotFound {
            message: message.into(),
        }
    }

    pub fn persistence<S: Into<String>>(message: S) -> Error {
        Error::Persistence {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Validation { message }
            | Error::Authentication { message }
            | Error::Forbidden { message }
            | Error::NotFound { message }
            | Error::Persistence { message } => message,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: self.message().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// Store failures never leak their cause to the caller.
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        log::error!("Database failure: {}", err);
        Error::persistence("Connection error. Please try again later.")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        log::error!("Document storage failure: {}", err);
        Error::persistence("Storage error. Please try again later.")
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        log::error!("Document serialization failure: {}", err);
        Error::persistence("Storage error. Please try again later.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Demo {
        value: u32,
    }

    #[test]
    fn reply_envelope_flattens_value() {
        let json = serde_json::to_value(Reply::of(Demo { value: 7 })).unwrap();
        assert_eq!(json, serde_json::json!({ "ok": true, "value": 7 }));
    }

    #[test]
    fn error_envelope_shape() {
        let body = ErrorBody {
            ok: false,
            error: "No clearance records found.".to_string(),
        };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "ok": false, "error": "No clearance records found." })
        );
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::authentication("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::persistence("x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_do_not_leak() {
        let err = Error::from(sqlx::Error::PoolClosed);
        assert_eq!(err.message(), "Connection error. Please try again later.");
    }
}
