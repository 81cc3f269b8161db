//! Typed failures that abort a provisioning run.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Malformed or missing input. Raised before any side effect.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A resource never became visible within the bounded wait
    #[error("timed out after {}s waiting for {resource} to become visible", waited.as_secs())]
    ProvisioningTimeout { resource: String, waited: Duration },

    /// A call into the identity/compute/network/database service failed
    #[error("{service} call failed: {message}")]
    ExternalService { service: String, message: String },
}

impl BootstrapError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wrap a collaborator error, keeping the operator hint
    pub fn external(service: &str, error: &cloudkit::Error) -> Self {
        Self::ExternalService {
            service: service.to_string(),
            message: format!("{} ({})", error, error.category().advice()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_names_the_resource() {
        let err = BootstrapError::ProvisioningTimeout {
            resource: "security group manila-service".into(),
            waited: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 30s waiting for security group manila-service to become visible"
        );
    }

    #[test]
    fn external_errors_carry_advice() {
        let source = cloudkit::Error::Unavailable {
            message: "connection refused".into(),
        };
        let err = BootstrapError::external("network", &source);
        let text = err.to_string();
        assert!(text.starts_with("network call failed: service unavailable"));
        assert!(text.contains("re-run"));
    }
}
