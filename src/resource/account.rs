//! Identity records for the share service: its user, the admin role
//! binding, and the catalog service with its endpoints.

use super::external;
use anyhow::Result;
use cloudkit::{CatalogService, Endpoint, Identity, Interface, NewUser};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState, WaitConfig};
use std::sync::Arc;

const SERVICE: &str = "identity";

/// Run `create`; if it fails, treat the record as created when `exists`
/// reports it within `wait` (another run got there first).
fn create_or_recheck(
    what: &str,
    wait: &WaitConfig,
    create: impl FnOnce() -> cloudkit::Result<()>,
    mut exists: impl FnMut() -> cloudkit::Result<bool>,
) -> Result<()> {
    let Err(error) = create() else {
        return Ok(());
    };
    if error.is_benign_race() {
        log::debug!("create of {what} conflicted, re-checking");
    } else {
        log::warn!("create of {what} failed ({error}), re-checking");
    }
    let outcome = declarative::poll_until(wait, || exists().map_err(|e| external(SERVICE, &e)))?;
    if outcome.is_ready() {
        log::info!("{what} was created concurrently");
        return Ok(());
    }
    Err(external(SERVICE, &error))
}

// ============================================================================
// User
// ============================================================================

#[derive(Debug)]
pub struct ServiceUser {
    user: NewUser,
    identity: Arc<dyn Identity>,
    wait: WaitConfig,
}

impl ServiceUser {
    pub fn new(user: NewUser, identity: Arc<dyn Identity>) -> Self {
        Self {
            user,
            identity,
            wait: WaitConfig::default(),
        }
    }

    /// How long a failed create keeps re-checking for a concurrent one
    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    fn exists(&self) -> Result<bool> {
        self.identity
            .user_exists(&self.user.name)
            .map_err(|e| external(SERVICE, &e))
    }
}

impl Resource for ServiceUser {
    fn id(&self) -> String {
        format!("user:{}", self.user.name)
    }

    fn description(&self) -> String {
        format!("User {} in project {}", self.user.name, self.user.project)
    }

    fn resource_type(&self) -> &'static str {
        "user"
    }

    fn current_state(&self) -> Result<ResourceState> {
        Ok(if self.exists()? {
            ResourceState::present()
        } else {
            ResourceState::Absent
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if self.exists()? {
            return Ok(ApplyResult::NoChange);
        }
        log::info!("Creating user {}", self.user.name);
        create_or_recheck(
            &format!("user {}", self.user.name),
            &self.wait,
            || self.identity.create_user(&self.user),
            || self.identity.user_exists(&self.user.name),
        )?;
        Ok(ApplyResult::Created)
    }
}

// ============================================================================
// Role binding
// ============================================================================

#[derive(Debug)]
pub struct RoleBinding {
    user: String,
    project: String,
    role: String,
    identity: Arc<dyn Identity>,
    wait: WaitConfig,
}

impl RoleBinding {
    pub fn new(
        user: impl Into<String>,
        project: impl Into<String>,
        role: impl Into<String>,
        identity: Arc<dyn Identity>,
    ) -> Self {
        Self {
            user: user.into(),
            project: project.into(),
            role: role.into(),
            identity,
            wait: WaitConfig::default(),
        }
    }

    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    fn bound(&self) -> Result<bool> {
        self.identity
            .has_role(&self.user, &self.project, &self.role)
            .map_err(|e| external(SERVICE, &e))
    }
}

impl Resource for RoleBinding {
    fn id(&self) -> String {
        format!("role:{}:{}:{}", self.user, self.project, self.role)
    }

    fn description(&self) -> String {
        format!(
            "Role {} for {} on project {}",
            self.role, self.user, self.project
        )
    }

    fn resource_type(&self) -> &'static str {
        "role"
    }

    fn current_state(&self) -> Result<ResourceState> {
        Ok(if self.bound()? {
            ResourceState::present()
        } else {
            ResourceState::Absent
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if self.bound()? {
            return Ok(ApplyResult::NoChange);
        }
        log::info!("Granting {} to {} on {}", self.role, self.user, self.project);
        create_or_recheck(
            &format!("role binding {}", self.id()),
            &self.wait,
            || self.identity.grant_role(&self.user, &self.project, &self.role),
            || self.identity.has_role(&self.user, &self.project, &self.role),
        )?;
        Ok(ApplyResult::Created)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog service plus one endpoint per interface, all in one region
#[derive(Debug)]
pub struct CatalogEntry {
    service: CatalogService,
    url: String,
    region: String,
    identity: Arc<dyn Identity>,
    wait: WaitConfig,
}

impl CatalogEntry {
    pub fn new(
        service: CatalogService,
        url: impl Into<String>,
        region: impl Into<String>,
        identity: Arc<dyn Identity>,
    ) -> Self {
        Self {
            service,
            url: url.into(),
            region: region.into(),
            identity,
            wait: WaitConfig::default(),
        }
    }

    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        Interface::ALL
            .iter()
            .map(|&interface| Endpoint {
                interface,
                url: self.url.clone(),
            })
            .collect()
    }

    fn service_exists(&self) -> Result<bool> {
        self.identity
            .service_exists(&self.service.name)
            .map_err(|e| external(SERVICE, &e))
    }

    fn missing_endpoints(&self) -> Result<Vec<Endpoint>> {
        let present = self
            .identity
            .list_endpoints(&self.service.name)
            .map_err(|e| external(SERVICE, &e))?;
        Ok(self
            .endpoints()
            .into_iter()
            .filter(|wanted| !present.contains(wanted))
            .collect())
    }

    fn ensure_endpoint(&self, endpoint: &Endpoint) -> Result<()> {
        log::info!(
            "Registering {} endpoint {} for {}",
            endpoint.interface,
            endpoint.url,
            self.service.name
        );
        create_or_recheck(
            &format!("{} endpoint", endpoint.interface),
            &self.wait,
            || {
                self.identity
                    .create_endpoint(&self.service.name, endpoint, &self.region)
            },
            || {
                self.identity
                    .list_endpoints(&self.service.name)
                    .map(|present| present.contains(endpoint))
            },
        )
    }
}

impl Resource for CatalogEntry {
    fn id(&self) -> String {
        format!("catalog:{}", self.service.name)
    }

    fn description(&self) -> String {
        format!(
            "Catalog service {} ({}) at {}",
            self.service.name, self.service.kind, self.url
        )
    }

    fn resource_type(&self) -> &'static str {
        "catalog"
    }

    fn current_state(&self) -> Result<ResourceState> {
        if !self.service_exists()? {
            return Ok(ResourceState::Absent);
        }
        let missing = self.missing_endpoints()?;
        if missing.is_empty() {
            return Ok(ResourceState::present());
        }
        let names: Vec<_> = missing.iter().map(|e| e.interface.as_str()).collect();
        Ok(ResourceState::Modified {
            from: format!("missing {} endpoint(s)", names.join(", ")),
            to: format!("{} endpoints", Interface::ALL.len()),
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let created = !self.service_exists()?;
        if created {
            log::info!("Creating catalog service {}", self.service.name);
            create_or_recheck(
                &format!("catalog service {}", self.service.name),
            &self.wait,
                || self.identity.create_service(&self.service),
                || self.identity.service_exists(&self.service.name),
            )?;
        }

        let missing = self.missing_endpoints()?;
        for endpoint in &missing {
            self.ensure_endpoint(endpoint)?;
        }

        Ok(match (created, missing.is_empty()) {
            (true, _) => ApplyResult::Created,
            (false, false) => ApplyResult::Modified,
            (false, true) => ApplyResult::NoChange,
        })
    }
}
