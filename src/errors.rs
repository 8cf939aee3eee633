use crate::{channel::types::ErrorObj, syntax::SyntaxError};
use axum::{http::StatusCode, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Syntax(#[from] SyntaxError),
    #[error("folder '{0}' not found")]
    NotFound(String),
    #[error("source path is not within the allowed directory")]
    PathOutsideRoot,
    #[error("source path is not within the allowed directory: symlinks that point outside the allowed directory are not allowed")]
    SourceSymlinkEscape,
    #[error("path contains symlinks that point outside the allowed directory")]
    SymlinkEscape,
    #[error("unauthorized")]
    Unauthorized,
    #[error("origin denied")]
    OriginDenied,
    #[error("request too large")]
    RequestTooLarge,
    #[error("rate limited")]
    RateLimited,
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),
    #[error("no authority available to authorize work units")]
    MissingAuthority,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid work unit: {0}")]
    BadRequest(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("build cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Where an error sits in the operator-facing taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected by string inspection; never starts a build.
    Syntax,
    /// The path is unsafe or missing.
    Containment,
    /// The hosting node refused or could not be reached.
    Authority,
    Io,
    /// Malformed or over-limit agent request.
    Request,
    Internal,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Syntax(_) => "Syntax",
            AppError::NotFound(_) => "NotFound",
            AppError::PathOutsideRoot => "PathOutsideRoot",
            AppError::SourceSymlinkEscape => "SourceSymlinkEscape",
            AppError::SymlinkEscape => "SymlinkEscape",
            AppError::Unauthorized => "Unauthorized",
            AppError::OriginDenied => "OriginDenied",
            AppError::RequestTooLarge => "RequestTooLarge",
            AppError::RateLimited => "RateLimited",
            AppError::AuthorizationDenied(_) => "AuthorizationDenied",
            AppError::MissingAuthority => "MissingAuthority",
            AppError::Transport(_) => "Transport",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Io(_) => "Io",
            AppError::Cancelled => "Cancelled",
            AppError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::OriginDenied
            | AppError::AuthorizationDenied(_)
            | AppError::MissingAuthority
            | AppError::PathOutsideRoot
            | AppError::SourceSymlinkEscape
            | AppError::SymlinkEscape => StatusCode::FORBIDDEN,
            AppError::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Syntax(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Io(_) | AppError::Cancelled | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Syntax(_) => ErrorClass::Syntax,
            AppError::NotFound(_)
            | AppError::PathOutsideRoot
            | AppError::SourceSymlinkEscape
            | AppError::SymlinkEscape => ErrorClass::Containment,
            AppError::Unauthorized
            | AppError::OriginDenied
            | AppError::RateLimited
            | AppError::AuthorizationDenied(_)
            | AppError::MissingAuthority
            | AppError::Transport(_) => ErrorClass::Authority,
            AppError::Io(_) => ErrorClass::Io,
            AppError::RequestTooLarge | AppError::BadRequest(_) => ErrorClass::Request,
            AppError::Cancelled | AppError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Rebuild an error from a `{code, message}` pair sent by a remote agent.
    ///
    /// Variants with a payload keep the remote message; codes this side does not
    /// know become [`AppError::Transport`].
    pub fn from_wire(err: ErrorObj) -> Self {
        let ErrorObj { code, message } = err;
        match code.as_str() {
            "NotFound" => AppError::NotFound(
                message
                    .strip_prefix("folder '")
                    .and_then(|m| m.strip_suffix("' not found"))
                    .unwrap_or(&message)
                    .to_string(),
            ),
            "PathOutsideRoot" => AppError::PathOutsideRoot,
            "SourceSymlinkEscape" => AppError::SourceSymlinkEscape,
            "SymlinkEscape" => AppError::SymlinkEscape,
            "Unauthorized" => AppError::Unauthorized,
            "OriginDenied" => AppError::OriginDenied,
            "RequestTooLarge" => AppError::RequestTooLarge,
            "RateLimited" => AppError::RateLimited,
            "AuthorizationDenied" => AppError::AuthorizationDenied(strip_prefix(&message, "authorization denied: ")),
            "MissingAuthority" => AppError::MissingAuthority,
            "BadRequest" => AppError::BadRequest(strip_prefix(&message, "invalid work unit: ")),
            "Io" => AppError::Io(strip_prefix(&message, "io error: ")),
            _ => AppError::Transport(format!("{code}: {message}")),
        }
    }

    pub fn to_wire(&self) -> ErrorObj {
        ErrorObj {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

fn strip_prefix(message: &str, prefix: &str) -> String {
    message.strip_prefix(prefix).unwrap_or(message).to_string()
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub fn into_response(err: AppError) -> (StatusCode, Json<ErrorObj>) {
    (err.status(), Json(err.to_wire()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip_keeps_denials_distinct() {
        let denied = AppError::AuthorizationDenied("unit 'canonicalize' requires role 'any'".into());
        match AppError::from_wire(denied.to_wire()) {
            AppError::AuthorizationDenied(m) => assert_eq!(m, "unit 'canonicalize' requires role 'any'"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(AppError::from_wire(AppError::SymlinkEscape.to_wire()), AppError::SymlinkEscape));
    }

    #[test]
    fn unknown_codes_become_transport() {
        let e = AppError::from_wire(ErrorObj { code: "Weird".into(), message: "boom".into() });
        assert_eq!(e.class(), ErrorClass::Authority);
        assert!(matches!(e, AppError::Transport(_)));
    }

    #[test]
    fn containment_messages_do_not_carry_paths() {
        for e in [AppError::PathOutsideRoot, AppError::SourceSymlinkEscape, AppError::SymlinkEscape] {
            assert_eq!(e.class(), ErrorClass::Containment);
            assert!(!e.to_string().contains('/'));
        }
    }
}
