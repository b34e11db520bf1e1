use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("too many requests: {message}")]
    TooManyRequests { message: String, retry_after_secs: u64, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Message safe to show to the caller. Client-side failures echo their detail;
    /// server-side failures never do.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. } => message.clone(),
            Self::Unauthorized { .. } => "Authentication is required.".to_string(),
            Self::TooManyRequests { .. } => {
                "You have exceeded your message quota. Please retry later.".to_string()
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly.".to_string()
            }
            Self::Internal { .. } => "An unexpected internal error occurred.".to_string(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::TooManyRequests { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. } | Self::Internal { .. })
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::TooManyRequests { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Validation(message)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::Domain(error @ DomainError::NotFound { .. }) => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(DomainError::Forbidden(message)) => {
                Self::Forbidden { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::Unauthenticated) => {
                Self::Unauthorized {
                    message: "missing or expired session".to_owned(),
                    correlation_id,
                }
            }
            ApplicationError::Domain(error @ DomainError::RateLimited { retry_after_secs }) => {
                Self::TooManyRequests {
                    message: error.to_string(),
                    retry_after_secs,
                    correlation_id,
                }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn validation_error_maps_to_bad_request_with_detail() {
        let interface =
            ApplicationError::from(DomainError::Validation("messages must not be empty".to_owned()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.user_message(), "messages must not be empty");
    }

    #[test]
    fn not_found_names_the_entity() {
        let interface =
            ApplicationError::from(DomainError::not_found("agent", "a-9")).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.user_message(), "agent `a-9` not found");
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let interface =
            ApplicationError::from(DomainError::RateLimited { retry_after_secs: 12 })
                .into_interface("req-3");

        assert!(matches!(
            interface,
            InterfaceError::TooManyRequests { retry_after_secs: 12, .. }
        ));
    }

    #[test]
    fn persistence_error_hides_detail() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(interface.is_server_error());
        assert!(!interface.user_message().contains("lock"));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing api key".to_owned()).into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
        assert_eq!(interface.correlation_id(), "req-5");
    }
}
