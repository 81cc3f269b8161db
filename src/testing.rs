//! In-memory collaborators for tests

use cloudkit::{
    CatalogService, Database, DatabaseKind, Endpoint, Error, Identity, Network, NewUser, Result,
    SecurityGroup, SecurityRule,
};
use std::collections::HashMap;
use std::sync::Mutex;

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Default)]
struct NetworkState {
    groups: Vec<SecurityGroup>,
    rules: HashMap<String, Vec<SecurityRule>>,
    /// Lookups a freshly created group stays hidden for
    visible_after: u32,
    hidden_lookups: HashMap<String, u32>,
    race_group_create: bool,
    fail_rule_creates: bool,
    group_creates: usize,
    rule_creates: usize,
}

/// Network service with scripted visibility delays and races
#[derive(Debug, Default)]
pub struct FakeNetwork {
    state: Mutex<NetworkState>,
}

impl FakeNetwork {
    pub fn seed_group(&self, name: &str, rules: &[SecurityRule]) {
        let mut state = self.state.lock().unwrap();
        state.groups.push(SecurityGroup {
            id: format!("id-{name}"),
            name: name.to_string(),
        });
        state.rules.insert(format!("id-{name}"), rules.to_vec());
    }

    /// Newly created groups are missing from the first `lookups` listings
    pub fn set_visible_after(&self, lookups: u32) {
        self.state.lock().unwrap().visible_after = lookups;
    }

    /// Group creation fails as if another run created the group first
    pub fn race_group_create(&self) {
        self.state.lock().unwrap().race_group_create = true;
    }

    pub fn fail_rule_creates(&self) {
        self.state.lock().unwrap().fail_rule_creates = true;
    }

    pub fn rules(&self, name: &str) -> Vec<SecurityRule> {
        let state = self.state.lock().unwrap();
        state
            .rules
            .get(&format!("id-{name}"))
            .cloned()
            .unwrap_or_default()
    }

    pub fn group_creates(&self) -> usize {
        self.state.lock().unwrap().group_creates
    }

    pub fn rule_creates(&self) -> usize {
        self.state.lock().unwrap().rule_creates
    }
}

impl Network for FakeNetwork {
    fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>> {
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.hidden_lookups.get_mut(name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Ok(None);
        }
        Ok(state.groups.iter().find(|g| g.name == name).cloned())
    }

    fn create_security_group(&self, name: &str, _description: &str) -> Result<SecurityGroup> {
        let mut state = self.state.lock().unwrap();
        let group = SecurityGroup {
            id: format!("id-{name}"),
            name: name.to_string(),
        };
        state.groups.push(group.clone());
        state.rules.entry(group.id.clone()).or_default();
        let hidden = state.visible_after;
        state.hidden_lookups.insert(name.to_string(), hidden);

        if state.race_group_create {
            return Err(Error::Conflict {
                message: format!("security group {name} already exists"),
            });
        }

        state.group_creates += 1;
        Ok(group)
    }

    fn list_ingress_rules(&self, group: &SecurityGroup) -> Result<Vec<SecurityRule>> {
        let state = self.state.lock().unwrap();
        Ok(state.rules.get(&group.id).cloned().unwrap_or_default())
    }

    fn create_ingress_rule(&self, group: &SecurityGroup, rule: &SecurityRule) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_rule_creates {
            return Err(Error::Unavailable {
                message: "network service down".into(),
            });
        }
        state.rule_creates += 1;
        state
            .rules
            .entry(group.id.clone())
            .or_default()
            .push(rule.clone());
        Ok(())
    }
}

// ============================================================================
// Identity
// ============================================================================

#[derive(Debug, Default)]
struct IdentityState {
    users: Vec<NewUser>,
    roles: Vec<(String, String, String)>,
    services: Vec<CatalogService>,
    endpoints: Vec<(String, Endpoint, String)>,
    calls: Vec<String>,
    fail_all: bool,
    /// Set by `race_user_create`: user creates conflict, and the user then
    /// stays unlisted for this many lookups
    race_users: Option<u32>,
    hidden_user_lookups: u32,
}

#[derive(Debug, Default)]
pub struct FakeIdentity {
    state: Mutex<IdentityState>,
}

impl FakeIdentity {
    pub fn failing() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().fail_all = true;
        fake
    }

    /// User creation fails as if another run created the user first, and
    /// the user shows up only after `lookups` listings
    pub fn race_user_create(&self, lookups: u32) {
        self.state.lock().unwrap().race_users = Some(lookups);
    }

    /// Mutating calls in order, e.g. `create_user manila`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        let state = self.state.lock().unwrap();
        state.endpoints.iter().map(|(_, e, _)| e.clone()).collect()
    }

    fn check(&self) -> Result<()> {
        if self.state.lock().unwrap().fail_all {
            return Err(Error::Auth {
                message: "invalid credentials".into(),
            });
        }
        Ok(())
    }
}

impl Identity for FakeIdentity {
    fn user_exists(&self, name: &str) -> Result<bool> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if state.hidden_user_lookups > 0 {
            state.hidden_user_lookups -= 1;
            return Ok(false);
        }
        Ok(state.users.iter().any(|u| u.name == name))
    }

    fn create_user(&self, user: &NewUser) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create_user {}", user.name));
        state.users.push(user.clone());
        if let Some(lookups) = state.race_users {
            state.hidden_user_lookups = lookups;
            return Err(Error::Conflict {
                message: format!("user {} already exists", user.name),
            });
        }
        Ok(())
    }

    fn has_role(&self, user: &str, project: &str, role: &str) -> Result<bool> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .roles
            .iter()
            .any(|(u, p, r)| u == user && p == project && r == role))
    }

    fn grant_role(&self, user: &str, project: &str, role: &str) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("grant_role {user} {project} {role}"));
        state
            .roles
            .push((user.to_string(), project.to_string(), role.to_string()));
        Ok(())
    }

    fn service_exists(&self, name: &str) -> Result<bool> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .services
            .iter()
            .any(|s| s.name == name))
    }

    fn create_service(&self, service: &CatalogService) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("create_service {} {}", service.name, service.kind));
        state.services.push(service.clone());
        Ok(())
    }

    fn list_endpoints(&self, service: &str) -> Result<Vec<Endpoint>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .endpoints
            .iter()
            .filter(|(s, _, _)| s == service)
            .map(|(_, e, _)| e.clone())
            .collect())
    }

    fn create_endpoint(&self, service: &str, endpoint: &Endpoint, region: &str) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!(
            "create_endpoint {} {}",
            service,
            endpoint.interface.as_str()
        ));
        state
            .endpoints
            .push((service.to_string(), endpoint.clone(), region.to_string()));
        Ok(())
    }
}

// ============================================================================
// Database
// ============================================================================

#[derive(Debug)]
pub struct FakeDatabase {
    kind: DatabaseKind,
    recreated: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeDatabase {
    pub fn new(kind: DatabaseKind) -> Self {
        Self {
            kind,
            recreated: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing(kind: DatabaseKind) -> Self {
        Self {
            fail: true,
            ..Self::new(kind)
        }
    }

    pub fn recreated(&self) -> Vec<String> {
        self.recreated.lock().unwrap().clone()
    }
}

impl Database for FakeDatabase {
    fn kind(&self) -> DatabaseKind {
        self.kind
    }

    fn recreate(&self, name: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Unavailable {
                message: "can't connect to server".into(),
            });
        }
        self.recreated.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
