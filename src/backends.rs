//! Enabled storage backends
//!
//! Two backend slots exist; the second one is only materialized in
//! multi-backend mode. Group names become artifact section names, so they are
//! validated here before anything is rendered.

use crate::error::BootstrapError;
use crate::settings::{BackendSlot, Settings};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static GROUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid regex")
});

/// Key material and instance login used by a backend's service instances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub public_key_path: Option<String>,
    pub private_key_path: Option<String>,
    pub instance_user: Option<String>,
    pub instance_password: Option<String>,
}

/// A named storage backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Section identifier, unique across enabled backends
    pub group_name: String,
    /// Value of `share_backend_name`
    pub display_name: String,
    pub driver_class: Option<String>,
    pub image_name: Option<String>,
    pub credentials: Credentials,
}

impl Backend {
    pub fn new(group_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            display_name: display_name.into(),
            driver_class: None,
            image_name: None,
            credentials: Credentials::default(),
        }
    }

    /// Build from a settings slot, falling back to the shared backend values
    fn from_slot(slot: &BackendSlot, settings: &Settings) -> Self {
        let shared = &settings.backends;
        Self {
            group_name: slot.group.clone(),
            display_name: slot.name.clone(),
            driver_class: slot.share_driver.clone().or(shared.share_driver.clone()),
            image_name: slot.image_name.clone().or(shared.image_name.clone()),
            credentials: Credentials {
                public_key_path: Some(
                    slot.public_key
                        .clone()
                        .unwrap_or_else(|| shared.public_key.clone()),
                ),
                private_key_path: Some(
                    slot.private_key
                        .clone()
                        .unwrap_or_else(|| shared.private_key.clone()),
                ),
                instance_user: slot.instance_user.clone().or(shared.instance_user.clone()),
                instance_password: slot
                    .instance_password
                    .clone()
                    .or(shared.instance_password.clone()),
            },
        }
    }

    fn validate(&self) -> Result<(), BootstrapError> {
        let group = &self.group_name;
        if group.is_empty() {
            return Err(BootstrapError::configuration("backend group name is empty"));
        }
        if !GROUP_NAME.is_match(group) {
            return Err(BootstrapError::configuration(format!(
                "backend group name '{group}' may only contain letters, digits, '_', '.' and '-'"
            )));
        }
        if group.eq_ignore_ascii_case("DEFAULT") {
            return Err(BootstrapError::configuration(
                "backend group name 'DEFAULT' collides with the DEFAULT section",
            ));
        }
        if self.display_name.trim().is_empty() {
            return Err(BootstrapError::configuration(format!(
                "backend '{group}' has an empty display name"
            )));
        }
        if self.display_name.contains(['\n', '\r']) {
            return Err(BootstrapError::configuration(format!(
                "backend '{group}' display name contains a line break"
            )));
        }
        Ok(())
    }
}

/// Ordered backends, first slot first
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    multi_backend: bool,
    backends: [Backend; 2],
}

impl BackendRegistry {
    /// Validate and order the two backend slots.
    ///
    /// With `multi_backend` off the second backend is kept but never
    /// enabled, and it is not validated: an unused slot can't break a run.
    pub fn new(multi_backend: bool, first: Backend, second: Backend) -> Result<Self, BootstrapError> {
        let registry = Self {
            multi_backend,
            backends: [first, second],
        };

        let mut seen = HashSet::new();
        for backend in registry.enabled() {
            backend.validate()?;
            if !seen.insert(backend.group_name.as_str()) {
                return Err(BootstrapError::configuration(format!(
                    "backend group name '{}' is used twice",
                    backend.group_name
                )));
            }
        }

        Ok(registry)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, BootstrapError> {
        let b = &settings.backends;
        Self::new(
            b.multi_backend,
            Backend::from_slot(&b.backend1, settings),
            Backend::from_slot(&b.backend2, settings),
        )
    }

    /// Enabled backends in order; never empty
    pub fn enabled(&self) -> &[Backend] {
        if self.multi_backend {
            &self.backends
        } else {
            &self.backends[..1]
        }
    }

    /// Value of `enabled_share_backends`
    pub fn enabled_backends_value(&self) -> String {
        self.enabled()
            .iter()
            .map(|b| b.group_name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn is_multi_backend(&self) -> bool {
        self.multi_backend
    }

    /// Distinct private key paths of the enabled backends, in order
    pub fn private_keys(&self) -> Vec<(&str, &str)> {
        let mut seen = HashSet::new();
        self.enabled()
            .iter()
            .filter_map(|b| {
                let private = b.credentials.private_key_path.as_deref()?;
                let public = b.credentials.public_key_path.as_deref()?;
                seen.insert(private).then_some((private, public))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Backend, Backend) {
        (
            Backend::new("backend1", "BACKEND1"),
            Backend::new("backend2", "BACKEND2"),
        )
    }

    #[test]
    fn single_backend_mode_enables_only_the_first() {
        let (first, second) = pair();
        let registry = BackendRegistry::new(false, first, second).unwrap();

        assert_eq!(registry.enabled().len(), 1);
        assert_eq!(registry.enabled()[0].group_name, "backend1");
        assert_eq!(registry.enabled_backends_value(), "backend1");
    }

    #[test]
    fn multi_backend_mode_keeps_input_order() {
        let (first, second) = pair();
        let registry = BackendRegistry::new(true, first, second).unwrap();

        let groups: Vec<_> = registry
            .enabled()
            .iter()
            .map(|b| b.group_name.as_str())
            .collect();
        assert_eq!(groups, vec!["backend1", "backend2"]);
        assert_eq!(registry.enabled_backends_value(), "backend1,backend2");
    }

    #[test]
    fn duplicate_groups_are_rejected_when_both_enabled() {
        let first = Backend::new("same", "A");
        let second = Backend::new("same", "B");
        assert!(BackendRegistry::new(true, first.clone(), second.clone()).is_err());
        assert!(BackendRegistry::new(false, first, second).is_ok());
    }

    #[test]
    fn group_names_are_validated() {
        for bad in ["", "has space", "DEFAULT", "default", "a[b]", "x=y"] {
            let result = BackendRegistry::new(
                false,
                Backend::new(bad, "NAME"),
                Backend::new("backend2", "B"),
            );
            assert!(result.is_err(), "accepted '{bad}'");
        }
        assert!(
            BackendRegistry::new(
                false,
                Backend::new("gluster_1.a-b", "NAME"),
                Backend::new("x", "X")
            )
            .is_ok()
        );
    }

    #[test]
    fn display_name_must_not_be_empty() {
        let result = BackendRegistry::new(
            false,
            Backend::new("backend1", "  "),
            Backend::new("backend2", "B"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn unused_second_slot_is_not_validated() {
        let result = BackendRegistry::new(
            false,
            Backend::new("backend1", "B1"),
            Backend::new("", ""),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn settings_slots_fall_back_to_shared_values() {
        let mut settings = Settings::default();
        settings.backends.multi_backend = true;
        settings.backends.image_name = Some("shared-image".into());
        settings.backends.backend2.image_name = Some("own-image".into());
        settings.backends.backend2.private_key = Some("/keys/paris".into());

        let registry = BackendRegistry::from_settings(&settings).unwrap();
        let [london, paris] = registry.enabled() else {
            panic!("expected two backends");
        };

        assert_eq!(london.image_name.as_deref(), Some("shared-image"));
        assert_eq!(paris.image_name.as_deref(), Some("own-image"));
        assert_eq!(
            london.credentials.private_key_path.as_deref(),
            Some("~/.ssh/id_rsa")
        );
        assert_eq!(
            paris.credentials.private_key_path.as_deref(),
            Some("/keys/paris")
        );
    }

    #[test]
    fn private_keys_are_deduplicated() {
        let mut settings = Settings::default();
        settings.backends.multi_backend = true;
        let registry = BackendRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.private_keys().len(), 1);

        settings.backends.backend2.private_key = Some("/keys/other".into());
        let registry = BackendRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.private_keys().len(), 2);
    }
}
