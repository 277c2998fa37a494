use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Store operation failed: {0}")]
    Store(String),

    /// A multi-step write failed and its rollback did not complete.
    #[error("{operation} left partial state: {detail}")]
    PartialFailure { operation: &'static str, detail: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn task_not_found(id: &str) -> Self {
        Error::NotFound { kind: "Task", id: id.to_string() }
    }

    pub fn user_not_found(id: &str) -> Self {
        Error::NotFound { kind: "User", id: id.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(e: mongodb::error::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for Error {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        Error::Store(format!("encode: {}", e))
    }
}

impl From<mongodb::bson::de::Error> for Error {
    fn from(e: mongodb::bson::de::Error) -> Self {
        Error::Store(format!("decode: {}", e))
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Store(_) | Error::PartialFailure { .. } | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
