// Uniform error taxonomy. Every kind carries a stable public code and a
// human message; callers only ever see the translated pair, never a driver
// error or a stack trace.
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use thiserror::Error;

/// Public error code: HTTP-style numeric for transport errors, short
/// alphanumeric for domain errors. Part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Http(u16),
    Domain(&'static str),
}

impl ErrorCode {
    /// Envelope representation: numeric codes serialize as numbers,
    /// domain codes as strings.
    pub fn to_value(self) -> Value {
        match self {
            ErrorCode::Http(status) => json!(status),
            ErrorCode::Domain(code) => json!(code),
        }
    }

    /// HTTP status carried by the response. Non-numeric codes ride on 200;
    /// the envelope body is the error signal.
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorCode::Http(status) => {
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ErrorCode::Domain(_) => StatusCode::OK,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Http(status) => write!(f, "{status}"),
            ErrorCode::Domain(code) => f.write_str(code),
        }
    }
}

/// Transport-facing errors with HTTP semantics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InternalServer(String),
}

impl TransportError {
    pub fn bad_request() -> Self {
        TransportError::BadRequest("Bad Request".to_string())
    }

    pub fn unauthorized() -> Self {
        TransportError::Unauthorized("Unauthorized".to_string())
    }

    pub fn forbidden() -> Self {
        TransportError::Forbidden("Forbidden".to_string())
    }

    pub fn not_found() -> Self {
        TransportError::NotFound("Not Found".to_string())
    }

    pub fn internal_server() -> Self {
        TransportError::InternalServer("Internal Server Error".to_string())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            TransportError::BadRequest(_) => ErrorCode::Http(400),
            TransportError::Unauthorized(_) => ErrorCode::Http(401),
            TransportError::Forbidden(_) => ErrorCode::Http(403),
            TransportError::NotFound(_) => ErrorCode::Http(404),
            TransportError::InternalServer(_) => ErrorCode::Http(500),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TransportError::BadRequest(msg)
            | TransportError::Unauthorized(msg)
            | TransportError::Forbidden(msg)
            | TransportError::NotFound(msg)
            | TransportError::InternalServer(msg) => msg,
        }
    }
}

/// Persistence errors, translated from accessor failures at the
/// orchestrator boundary. The D-codes are stable public contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("{0}")]
    Add(String),
    #[error("{0}")]
    Remove(String),
    #[error("{0}")]
    Update(String),
    #[error("{0}")]
    Find(String),
    #[error("{0}")]
    NotExist(String),
    #[error("{0}")]
    Locked(String),
    #[error("{0}")]
    NotCorrect(String),
}

impl PersistenceError {
    pub fn add() -> Self {
        PersistenceError::Add("Failed to Add".to_string())
    }

    pub fn remove() -> Self {
        PersistenceError::Remove("Failed to Remove".to_string())
    }

    pub fn update() -> Self {
        PersistenceError::Update("Failed to Update".to_string())
    }

    pub fn find() -> Self {
        PersistenceError::Find("Failed to Find".to_string())
    }

    pub fn not_exist() -> Self {
        PersistenceError::NotExist("Not Exist".to_string())
    }

    pub fn locked() -> Self {
        PersistenceError::Locked("Collection is locked".to_string())
    }

    pub fn not_correct() -> Self {
        PersistenceError::NotCorrect("Not Correct".to_string())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            PersistenceError::Add(_) => ErrorCode::Domain("D0001"),
            PersistenceError::Remove(_) => ErrorCode::Domain("D0002"),
            PersistenceError::Update(_) => ErrorCode::Domain("D0003"),
            PersistenceError::Find(_) => ErrorCode::Domain("D0004"),
            PersistenceError::NotExist(_) => ErrorCode::Domain("D1004"),
            PersistenceError::Locked(_) => ErrorCode::Domain("D1005"),
            PersistenceError::NotCorrect(_) => ErrorCode::Domain("D1006"),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PersistenceError::Add(msg)
            | PersistenceError::Remove(msg)
            | PersistenceError::Update(msg)
            | PersistenceError::Find(msg)
            | PersistenceError::NotExist(msg)
            | PersistenceError::Locked(msg)
            | PersistenceError::NotCorrect(msg) => msg,
        }
    }
}

/// Request parameter errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Password(String),
}

impl ParameterError {
    pub fn invalid() -> Self {
        ParameterError::Invalid("Param Error".to_string())
    }

    pub fn password() -> Self {
        ParameterError::Password("Password Error".to_string())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ParameterError::Invalid(_) => ErrorCode::Domain("P0000"),
            ParameterError::Password(_) => ErrorCode::Domain("P0001"),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParameterError::Invalid(msg) | ParameterError::Password(msg) => msg,
        }
    }
}

/// System and configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SystemError {
    #[error("{0}")]
    Generic(String),
    #[error("{0}")]
    Config(String),
}

impl SystemError {
    pub fn generic() -> Self {
        SystemError::Generic("System Error".to_string())
    }

    pub fn config() -> Self {
        SystemError::Config("Config Error".to_string())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SystemError::Generic(_) => ErrorCode::Domain("S0000"),
            SystemError::Config(_) => ErrorCode::Domain("S0001"),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SystemError::Generic(msg) | SystemError::Config(msg) => msg,
        }
    }
}

/// Umbrella over the four families; the type actions and handlers return.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    System(#[from] SystemError),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Transport(e) => e.code(),
            ApiError::Persistence(e) => e.code(),
            ApiError::Parameter(e) => e.code(),
            ApiError::System(e) => e.code(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Transport(e) => e.message(),
            ApiError::Persistence(e) => e.message(),
            ApiError::Parameter(e) => e.message(),
            ApiError::System(e) => e.message(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code().http_status()
    }

    /// Full envelope body for this error.
    pub fn to_json(&self) -> Value {
        crate::response::error_body(self.code(), self.message(), None)
    }
}

// Shorthand constructors for the transport family, which handlers raise
// directly.
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        TransportError::BadRequest(message.into()).into()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        TransportError::Unauthorized(message.into()).into()
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        TransportError::Forbidden(message.into()).into()
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        TransportError::NotFound(message.into()).into()
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        TransportError::InternalServer(message.into()).into()
    }
}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
