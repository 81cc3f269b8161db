//! Security group for the service instances, with a fixed ingress policy

use super::external;
use crate::error::BootstrapError;
use anyhow::Result;
use cloudkit::{ANY_IPV4, Network, PortRange, Protocol, SecurityGroup, SecurityRule};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState, WaitConfig, WaitOutcome};
use std::sync::Arc;

/// Inbound rules the share service instances need: ping, SSH, NFS, CIFS
/// and NetBIOS, all from anywhere.
pub fn service_policy() -> Vec<SecurityRule> {
    let mut rules = vec![
        SecurityRule::new(Protocol::Icmp, PortRange::Any, ANY_IPV4),
        SecurityRule::new(Protocol::Tcp, PortRange::single(22), ANY_IPV4),
    ];
    for ports in [
        PortRange::single(2049),
        PortRange::single(445),
        PortRange::range(137, 139),
    ] {
        rules.push(SecurityRule::new(Protocol::Tcp, ports, ANY_IPV4));
        rules.push(SecurityRule::new(Protocol::Udp, ports, ANY_IPV4));
    }
    rules
}

fn missing_rules<'a>(policy: &'a [SecurityRule], present: &[SecurityRule]) -> Vec<&'a SecurityRule> {
    policy
        .iter()
        .filter(|wanted| !present.iter().any(|have| have.is_equivalent(wanted)))
        .collect()
}

#[derive(Debug)]
pub struct SecurityGroupResource {
    name: String,
    description: String,
    policy: Vec<SecurityRule>,
    network: Arc<dyn Network>,
    wait: WaitConfig,
}

impl SecurityGroupResource {
    pub fn new(name: impl Into<String>, network: Arc<dyn Network>, wait: WaitConfig) -> Self {
        Self {
            name: name.into(),
            description: "Share service instances".to_string(),
            policy: service_policy(),
            network,
            wait,
        }
    }

    fn find(&self) -> Result<Option<SecurityGroup>> {
        self.network
            .find_security_group(&self.name)
            .map_err(|e| external("network", &e))
    }

    /// Create the group, tolerating a concurrent creator.
    ///
    /// A failed create is re-checked for the whole visibility wait, since a
    /// group another run just created may not be listed yet.
    fn create(&self) -> Result<()> {
        log::info!("Creating security group {}", self.name);
        let Err(error) = self
            .network
            .create_security_group(&self.name, &self.description)
        else {
            return Ok(());
        };

        log::debug!("create of {} failed ({}), re-checking", self.name, error);
        let outcome = declarative::poll_until(&self.wait, || Ok(self.find()?.is_some()))?;
        if outcome.is_ready() {
            log::info!("Security group {} was created concurrently", self.name);
            return Ok(());
        }
        Err(external("network", &error))
    }

    /// Block until the group shows up in listings
    fn wait_visible(&self) -> Result<SecurityGroup> {
        let mut found = None;
        let outcome = declarative::poll_until(&self.wait, || {
            found = self.find()?;
            Ok(found.is_some())
        })?;

        if let (WaitOutcome::Ready { attempts }, Some(group)) = (outcome, found) {
            log::debug!("{} visible after {} checks", self.name, attempts);
            return Ok(group);
        }

        let waited = match outcome {
            WaitOutcome::TimedOut { waited } => waited,
            WaitOutcome::Ready { .. } => self.wait.timeout,
        };
        Err(BootstrapError::ProvisioningTimeout {
            resource: format!("security group {}", self.name),
            waited,
        }
        .into())
    }

    fn ensure_rule(&self, group: &SecurityGroup, rule: &SecurityRule) -> Result<()> {
        log::info!("Adding rule {} to {}", rule, self.name);
        if let Err(error) = self.network.create_ingress_rule(group, rule) {
            let present = self
                .network
                .list_ingress_rules(group)
                .map_err(|e| external("network", &e))?;
            if present.iter().any(|have| have.is_equivalent(rule)) {
                log::debug!("rule appeared concurrently: {error}");
                return Ok(());
            }
            return Err(external("network", &error));
        }
        Ok(())
    }
}

impl Resource for SecurityGroupResource {
    fn id(&self) -> String {
        format!("secgroup:{}", self.name)
    }

    fn description(&self) -> String {
        format!("Security group {} with {} rules", self.name, self.policy.len())
    }

    fn resource_type(&self) -> &'static str {
        "security_group"
    }

    fn current_state(&self) -> Result<ResourceState> {
        let Some(group) = self.find()? else {
            return Ok(ResourceState::Absent);
        };
        let present = self
            .network
            .list_ingress_rules(&group)
            .map_err(|e| external("network", &e))?;
        let missing = missing_rules(&self.policy, &present);

        if missing.is_empty() {
            Ok(ResourceState::present())
        } else {
            Ok(ResourceState::Modified {
                from: format!("{} rules missing", missing.len()),
                to: format!("{} rules", self.policy.len()),
            })
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let (group, created) = match self.find()? {
            Some(group) => (group, false),
            None => {
                self.create()?;
                (self.wait_visible()?, true)
            }
        };

        let present = self
            .network
            .list_ingress_rules(&group)
            .map_err(|e| external("network", &e))?;
        let missing = missing_rules(&self.policy, &present);

        for rule in &missing {
            self.ensure_rule(&group, rule)?;
        }

        Ok(match (created, missing.is_empty()) {
            (true, _) => ApplyResult::Created,
            (false, false) => ApplyResult::Modified,
            (false, true) => ApplyResult::NoChange,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeNetwork;
    use std::time::Duration;

    fn resource(network: &Arc<FakeNetwork>) -> SecurityGroupResource {
        SecurityGroupResource::new(
            "manila-service",
            network.clone(),
            WaitConfig::new(Duration::from_millis(50), Duration::from_millis(5)),
        )
    }

    fn apply(resource: &SecurityGroupResource) -> Result<ApplyResult> {
        resource.apply(&mut ApplyContext::new(false))
    }

    #[test]
    fn policy_has_the_fixed_rule_set() {
        let policy = service_policy();
        assert_eq!(policy.len(), 8);
        assert!(policy.iter().all(|r| r.source == ANY_IPV4));
        assert!(policy.contains(&SecurityRule::new(
            Protocol::Udp,
            PortRange::range(137, 139),
            ANY_IPV4
        )));
    }

    #[test]
    fn creates_group_and_every_rule() {
        let network = Arc::new(FakeNetwork::default());
        let sg = resource(&network);

        assert_eq!(sg.current_state().unwrap(), ResourceState::Absent);
        assert_eq!(apply(&sg).unwrap(), ApplyResult::Created);
        assert_eq!(network.rules("manila-service").len(), 8);
        assert_eq!(sg.current_state().unwrap(), ResourceState::present());
    }

    #[test]
    fn applying_twice_yields_the_same_rule_set() {
        let network = Arc::new(FakeNetwork::default());
        let sg = resource(&network);

        apply(&sg).unwrap();
        let first = network.rules("manila-service");
        assert_eq!(apply(&sg).unwrap(), ApplyResult::NoChange);
        let second = network.rules("manila-service");

        assert_eq!(first, second);
        assert_eq!(network.group_creates(), 1);
        assert_eq!(network.rule_creates(), 8);
    }

    #[test]
    fn adds_only_missing_rules_to_existing_group() {
        let network = Arc::new(FakeNetwork::default());
        network.seed_group("manila-service", &service_policy()[..3]);
        let sg = resource(&network);

        assert!(matches!(
            sg.current_state().unwrap(),
            ResourceState::Modified { .. }
        ));
        assert_eq!(apply(&sg).unwrap(), ApplyResult::Modified);
        assert_eq!(network.rule_creates(), 5);
        assert_eq!(network.rules("manila-service").len(), 8);
    }

    #[test]
    fn equivalent_rules_are_matched_by_content_not_identity() {
        let network = Arc::new(FakeNetwork::default());
        // ICMP listed with a port range and a blank source still matches
        let mut seeded = service_policy();
        seeded[0] = SecurityRule::new(Protocol::Icmp, PortRange::range(0, 255), "");
        network.seed_group("manila-service", &seeded);

        assert_eq!(apply(&resource(&network)).unwrap(), ApplyResult::NoChange);
    }

    #[test]
    fn waits_for_a_slow_group_to_appear() {
        let network = Arc::new(FakeNetwork::default());
        network.set_visible_after(3);
        assert_eq!(apply(&resource(&network)).unwrap(), ApplyResult::Created);
    }

    #[test]
    fn invisible_group_times_out() {
        let network = Arc::new(FakeNetwork::default());
        network.set_visible_after(u32::MAX);
        let err = apply(&resource(&network)).unwrap_err();

        match err.downcast_ref::<BootstrapError>() {
            Some(BootstrapError::ProvisioningTimeout { resource, .. }) => {
                assert_eq!(resource, "security group manila-service");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_group_creation_counts_as_success() {
        let network = Arc::new(FakeNetwork::default());
        network.race_group_create();
        assert_eq!(apply(&resource(&network)).unwrap(), ApplyResult::Created);
        assert_eq!(network.rules("manila-service").len(), 8);
    }

    #[test]
    fn concurrent_group_not_yet_listed_is_waited_for() {
        let network = Arc::new(FakeNetwork::default());
        network.race_group_create();
        network.set_visible_after(3);
        assert_eq!(apply(&resource(&network)).unwrap(), ApplyResult::Created);
        assert_eq!(network.rules("manila-service").len(), 8);
    }

    #[test]
    fn failed_rule_create_is_an_external_error() {
        let network = Arc::new(FakeNetwork::default());
        network.fail_rule_creates();
        let err = apply(&resource(&network)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootstrapError>(),
            Some(BootstrapError::ExternalService { .. })
        ));
    }
}
