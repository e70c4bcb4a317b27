use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriberErrorCode {
    InvalidArgument,
    PermissionDenied,
    Unavailable,
}

impl SubscriberErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberErrorCode::InvalidArgument => "subscriber/invalid-argument",
            SubscriberErrorCode::PermissionDenied => "subscriber/permission-denied",
            SubscriberErrorCode::Unavailable => "subscriber/unavailable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriberError {
    pub code: SubscriberErrorCode,
    message: String,
}

impl SubscriberError {
    pub fn new(code: SubscriberErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SubscriberError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for SubscriberError {}

pub type SubscriberResult<T> = Result<T, SubscriberError>;

pub fn invalid_argument(message: impl Into<String>) -> SubscriberError {
    SubscriberError::new(SubscriberErrorCode::InvalidArgument, message)
}

pub fn permission_denied(message: impl Into<String>) -> SubscriberError {
    SubscriberError::new(SubscriberErrorCode::PermissionDenied, message)
}

pub fn unavailable(message: impl Into<String>) -> SubscriberError {
    SubscriberError::new(SubscriberErrorCode::Unavailable, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let error = permission_denied("Missing or insufficient permissions.");
        assert_eq!(
            error.to_string(),
            "Missing or insufficient permissions. (subscriber/permission-denied)"
        );
        assert_eq!(error.message(), "Missing or insufficient permissions.");
    }
}
