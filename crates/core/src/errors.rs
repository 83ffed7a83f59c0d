use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    InvalidCheckoutTransition(#[from] FlowTransitionError),
    #[error("checkout invariant violation: {0}")]
    InvariantViolation(String),
    #[error("product `{product_id}` no longer resolves to a sellable item")]
    UnresolvableProduct { product_id: String },
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
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Customer-facing text. Internal details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "ขออภัยค่ะ ไม่สามารถดำเนินการได้ กรุณาลองใหม่อีกครั้ง 🙏",
            Self::ServiceUnavailable { .. } => "ขออภัยค่ะ ระบบขัดข้องชั่วคราว กรุณาลองใหม่ในอีกสักครู่ 🙏",
            Self::Internal { .. } => "ขออภัยค่ะ เกิดข้อผิดพลาด กรุณาลองใหม่อีกครั้ง 🙏",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::checkout::CheckoutStep;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::flows::{FlowEvent, FlowTransitionError};

    #[test]
    fn invariant_violation_maps_to_bad_request_with_correlation_id() {
        let interface = ApplicationError::from(DomainError::UnresolvableProduct {
            product_id: "p-404".to_owned(),
        })
        .into_interface("turn-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, ref message }
                if correlation_id == "turn-1" && message.contains("p-404")
        ));
        assert_eq!(interface.correlation_id(), "turn-1");
    }

    #[test]
    fn transition_error_converts_into_domain_error() {
        let error = DomainError::from(FlowTransitionError {
            from: CheckoutStep::Confirmed,
            event: FlowEvent::AddressCompleted,
        });
        assert!(error.to_string().contains("confirmed"));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Persistence("state store timeout".to_owned()).into_interface("turn-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(interface.user_message().contains("ชั่วคราว"));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing tenant".to_owned()).into_interface("turn-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "ขออภัยค่ะ เกิดข้อผิดพลาด กรุณาลองใหม่อีกครั้ง 🙏");
    }
}
