use std::any::Any;
use std::backtrace::BacktraceStatus;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use membank_database::DatabaseError;
use serde::Serialize;
use tracing::{error, warn};

/// Body sent for every failure the boundary cannot classify.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// Number of causes and backtrace frames kept in a reported trace.
const TRACE_DEPTH: usize = 5;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    opaque: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            opaque: false,
        }
    }

    /// The uniform last-resort response: 500 with a fixed plain-text body.
    pub fn generic() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: GENERIC_ERROR_MESSAGE.to_string(),
            opaque: true,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn is_generic(&self) -> bool {
        self.opaque
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.opaque {
            return (self.status, GENERIC_ERROR_MESSAGE).into_response();
        }

        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        error!(trace = %truncated_trace(&error), "Exception");
        Self::generic()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(error: DatabaseError) -> Self {
        let kind = error.kind();
        match error {
            DatabaseError::NotFound(_) => {
                warn!(kind, error = %error, "database error");
                Self::not_found(error.to_string())
            }
            DatabaseError::Duplicate(_) => {
                warn!(kind, error = %error, "database error");
                Self::conflict(error.to_string())
            }
            DatabaseError::ValidationError(_) => {
                warn!(kind, error = %error, "database error");
                Self::bad_request(error.to_string())
            }
            DatabaseError::ConnectionError(_) => {
                error!(kind, error = %error, "database unavailable");
                Self::service_unavailable("database unavailable")
            }
            DatabaseError::StorageError { .. } => Self::from(anyhow::Error::new(error)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection, "rejected request body");
        Self::bad_request(rejection.body_text())
    }
}

/// Render the failure's description, its first causes, and the first
/// captured backtrace frames, each capped at [`TRACE_DEPTH`].
pub fn truncated_trace(error: &anyhow::Error) -> String {
    let mut trace = error.to_string();

    for cause in error.chain().skip(1).take(TRACE_DEPTH) {
        trace.push_str("\n\tcaused by: ");
        trace.push_str(&cause.to_string());
    }

    let backtrace = error.backtrace();
    if backtrace.status() == BacktraceStatus::Captured {
        for frame in origin_frames(&backtrace.to_string()).take(TRACE_DEPTH) {
            trace.push_str("\n\tat ");
            trace.push_str(frame);
        }
    }

    trace
}

/// Frames that only record how the error was captured and converted.
const CAPTURE_FRAME_PREFIXES: &[&str] = &[
    "std::backtrace",
    "anyhow::",
    "<anyhow::",
    "core::convert::",
    "<T as core::convert::",
    "membank_backend_api::error::",
    "<membank_backend_api::error::",
];

/// Frame headers of a rendered backtrace, starting at the first frame that
/// is not part of error capture or conversion.
fn origin_frames(rendered: &str) -> impl Iterator<Item = &str> {
    rendered
        .lines()
        .filter_map(frame_symbol)
        .skip_while(|symbol| {
            CAPTURE_FRAME_PREFIXES
                .iter()
                .any(|prefix| symbol.starts_with(prefix))
        })
}

/// The symbol of a `N: symbol` frame header line.
fn frame_symbol(line: &str) -> Option<&str> {
    let (index, symbol) = line.trim_start().split_once(':')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(symbol.trim())
}

/// Panic hook for [`tower_http::catch_panic::CatchPanicLayer`].
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else {
        "unknown panic payload"
    };

    error!(trace = %format!("panic: {detail}"), "Exception");
    ApiError::generic().into_response()
}
