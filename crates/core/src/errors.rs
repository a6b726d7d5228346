use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("user message must not be empty")]
    EmptyUserMessage,
    #[error("bot response must not be empty")]
    EmptyBotResponse,
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("completion failure: {0}")]
    Completion(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("upstream failure: {message}")]
    UpstreamFailure { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "Message cannot be empty",
            Self::UpstreamFailure { .. } | Self::Internal { .. } => {
                "I apologize, but I encountered an error while processing your message. \
                 Please try again in a moment."
            }
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::UpstreamFailure { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl ApplicationError {
    /// Non-technical text safe to show an end user; diagnostics travel
    /// separately via [`InterfaceError::detail`].
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Domain(_) => "Message cannot be empty",
            Self::Completion(_) | Self::Persistence(_) | Self::Configuration(_) => {
                "I apologize, but I encountered an error while processing your message. \
                 Please try again in a moment."
            }
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::UpstreamFailure { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Completion(message) | ApplicationError::Persistence(message) => {
                Self::UpstreamFailure { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::EmptyUserMessage).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn bad_request_has_user_safe_message() {
        let interface =
            ApplicationError::from(DomainError::EmptyUserMessage).into_interface("req-2");

        assert_eq!(interface.user_message(), "Message cannot be empty");
    }

    #[test]
    fn completion_error_maps_to_upstream_failure_with_apologetic_message() {
        let interface = ApplicationError::Completion("completion endpoint returned 502".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::UpstreamFailure { .. }));
        assert!(interface.user_message().starts_with("I apologize"));
        assert_eq!(interface.detail(), "completion endpoint returned 502");
    }

    #[test]
    fn persistence_error_maps_to_upstream_failure() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::UpstreamFailure { .. }));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid api key".to_owned()).into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert!(interface.user_message().starts_with("I apologize"));
    }

    #[test]
    fn user_message_is_stable_across_layers() {
        let application = ApplicationError::Completion("completion timed out".to_owned());
        let expected = application.user_message();

        assert_eq!(application.into_interface("req-6").user_message(), expected);
    }
}
