use crate::model::ValidationError;
use crate::notification::SchedulerError;
use crate::providers::ProviderError;
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    User,
    Network,
    Storage,
    Scheduling,
    PermissionDenied,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Scheduling => "scheduling",
            Self::PermissionDenied => "permission_denied",
        }
    }

    fn default_code(self) -> &'static str {
        match self {
            Self::User => "user.invalid_input",
            Self::Network => "runtime.network_failed",
            Self::Storage => "runtime.storage_failed",
            Self::Scheduling => "runtime.scheduling_failed",
            Self::PermissionDenied => "user.permission_denied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    /// Stable machine-readable code, e.g. `user.location_missing`.
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.default_code(),
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = code;
        self
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User, message)
    }

    pub fn location_missing() -> Self {
        Self::user("no location selected: run `umbrella-cli location set --city <name>` first")
            .with_code("user.location_missing")
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    /// Network and scheduling failures get a retry affordance; permission
    /// denials are never retried automatically.
    pub fn retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::Scheduling)
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::User => 2,
            ErrorKind::PermissionDenied => 3,
            ErrorKind::Network | ErrorKind::Storage | ErrorKind::Scheduling => 1,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AppError {}

impl From<ValidationError> for AppError {
    fn from(value: ValidationError) -> Self {
        Self::user(value.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::NotFound(query) => {
                Self::user(format!("location not found: {query}")).with_code("user.location_not_found")
            }
            other => Self::new(
                ErrorKind::Network,
                format!("failed to fetch forecast: {other}"),
            ),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        Self::new(ErrorKind::Storage, value.to_string())
    }
}

impl From<SchedulerError> for AppError {
    fn from(value: SchedulerError) -> Self {
        Self::new(
            ErrorKind::Scheduling,
            format!("failed to schedule notification: {value}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_exit_codes_are_stable() {
        assert_eq!(AppError::user("x").exit_code(), 2);
        assert_eq!(AppError::permission_denied("x").exit_code(), 3);
        assert_eq!(AppError::new(ErrorKind::Network, "x").exit_code(), 1);
        assert_eq!(AppError::new(ErrorKind::Storage, "x").exit_code(), 1);
    }

    #[test]
    fn error_retry_affordance_matches_kind() {
        assert!(AppError::new(ErrorKind::Network, "x").retryable());
        assert!(AppError::new(ErrorKind::Scheduling, "x").retryable());
        assert!(!AppError::new(ErrorKind::Storage, "x").retryable());
        assert!(!AppError::permission_denied("x").retryable());
    }

    #[test]
    fn error_provider_not_found_is_user_error() {
        let error = AppError::from(ProviderError::NotFound("Atlantis".to_string()));
        assert_eq!(error.kind, ErrorKind::User);
        assert_eq!(error.code, "user.location_not_found");
        assert!(error.message.contains("Atlantis"));

        let error = AppError::from(ProviderError::Transport("timeout".to_string()));
        assert_eq!(error.kind, ErrorKind::Network);
    }

    #[test]
    fn error_codes_follow_kind_unless_overridden() {
        assert_eq!(AppError::user("x").code, "user.invalid_input");
        assert_eq!(AppError::location_missing().code, "user.location_missing");
        assert_eq!(AppError::location_missing().kind, ErrorKind::User);
        assert_eq!(
            AppError::new(ErrorKind::Scheduling, "x").code,
            "runtime.scheduling_failed"
        );
    }
}
