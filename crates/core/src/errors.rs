use std::time::Duration;

use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
}

/// Why a call turn or a dashboard read could not complete.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("turn timed out after {0:?}")]
    TurnTimeout(Duration),
}

impl ApplicationError {
    /// Stable label recorded on failure audit events.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::Persistence(_) => "persistence",
            Self::TurnTimeout(_) => "turn_timeout",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Domain(error) => InterfaceError::Internal { message: error.to_string(), correlation_id },
            Self::Persistence(message) => InterfaceError::ServiceUnavailable { message, correlation_id },
            Self::TurnTimeout(limit) => InterfaceError::ServiceUnavailable {
                message: format!("turn exceeded {limit:?}"),
                correlation_id,
            },
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::ServiceUnavailable { correlation_id, .. } | Self::Internal { correlation_id, .. } => {
                correlation_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::flows::{ConversationState, FlowTransitionError, TurnEvent};

    #[test]
    fn terminal_transition_maps_to_internal_interface_error() {
        let error = ApplicationError::from(DomainError::from(FlowTransitionError::TerminalState {
            state: ConversationState::Confirmed,
            event: TurnEvent::Affirmed,
        }));
        assert_eq!(error.error_class(), "domain");

        let interface = error.into_interface("turn-1");
        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.correlation_id(), "turn-1");
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("turn-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn turn_timeout_is_classified_and_retryable() {
        let error = ApplicationError::TurnTimeout(Duration::from_secs(15));

        assert_eq!(error.error_class(), "turn_timeout");
        assert_eq!(error.to_string(), "turn timed out after 15s");
        assert!(matches!(error.into_interface("turn-4"), InterfaceError::ServiceUnavailable { .. }));
    }
}
