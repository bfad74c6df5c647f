use http::StatusCode;
use spin_sdk::http::Response;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Email and password required")]
    MissingFields,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid email")]
    InvalidEmail,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("{0}")]
    NotFound(String),

    #[error("Not found or unauthorized")]
    NotFoundOrUnauthorized,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Username already taken")]
    DuplicateUsername,

    #[error("Cannot follow yourself")]
    SelfFollow,

    #[error("Server error")]
    Server(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    /// Machine-stable reason code carried in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::MissingFields => "missing_fields",
            ApiError::Unauthorized => "unauthorized",
            ApiError::InvalidEmail => "invalid_email",
            ApiError::InvalidPassword => "invalid_password",
            ApiError::NotFound(_) => "not_found",
            ApiError::NotFoundOrUnauthorized => "not_found_or_unauthorized",
            ApiError::DuplicateEmail => "duplicate_email",
            ApiError::DuplicateUsername => "duplicate_username",
            ApiError::SelfFollow => "self_reference_error",
            ApiError::Server(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::MissingFields
            | ApiError::InvalidEmail
            | ApiError::InvalidPassword
            | ApiError::SelfFollow => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) | ApiError::NotFoundOrUnauthorized => StatusCode::NOT_FOUND,
            ApiError::DuplicateEmail | ApiError::DuplicateUsername => StatusCode::CONFLICT,
            ApiError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        if let ApiError::Server(inner) = &err {
            error!("request failed: {inner:#}");
        }

        let body = serde_json::json!({
            "success": false,
            "error": err.code(),
            "message": err.to_string(),
        });

        Response::builder()
            .status(err.status().as_u16())
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(body.to_string().into_bytes())
            .build()
    }
}
