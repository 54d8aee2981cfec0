use crate::providers::ConfigError;
use crate::transcode::TranscodeError;
use crate::upstream::UpstreamCallError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub error_type: String,
    pub param: Option<String>,
}

impl AppError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            error_type: "invalid_request_error".to_string(),
            param: None,
        }
    }

    /// A failure on our side rather than in the request.
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message).with_type("server_error")
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    param: Option<String>,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: ErrorBody {
                message: self.message,
                error_type: self.error_type,
                param: self.param,
                code: self.code,
            },
        };
        (self.status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Failure modes of a single relayed chat request.
///
/// `ClientDisconnected` is a normal termination path: it never produces a
/// response, it only drives upstream release.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamCallError),
    #[error("transcode error: {0}")]
    Transcode(#[from] TranscodeError),
    #[error("client disconnected")]
    ClientDisconnected,
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Configuration(ConfigError::UnknownModel(_)) => "model_not_found",
            RelayError::Configuration(ConfigError::MissingCredential { .. }) => {
                "provider_not_configured"
            }
            RelayError::Upstream(_) => "upstream_error",
            RelayError::Transcode(_) => "transcode_error",
            RelayError::ClientDisconnected => "client_disconnected",
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Configuration(ConfigError::UnknownModel(_)) => "invalid_request_error",
            RelayError::Configuration(ConfigError::MissingCredential { .. }) => "server_error",
            RelayError::Upstream(_) => "upstream_error",
            RelayError::Transcode(_) => "transcode_error",
            RelayError::ClientDisconnected => "client_disconnected",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            RelayError::Configuration(ConfigError::UnknownModel(_)) => StatusCode::NOT_FOUND,
            RelayError::Configuration(ConfigError::MissingCredential { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RelayError::Transcode(_) => StatusCode::BAD_GATEWAY,
            // Nobody is left to read it.
            RelayError::ClientDisconnected => StatusCode::NO_CONTENT,
        }
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        let mut app = AppError::new(err.status(), err.code(), err.to_string())
            .with_type(err.error_type());
        if matches!(err, RelayError::Configuration(ConfigError::UnknownModel(_))) {
            app = app.with_param("model_name");
        }
        app
    }
}
