//! Plan/apply helpers shared by the integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file
//! in `tests/`), so this module is pulled in with:
//!
//! ```rust
//! #[path = "common/harness.rs"]
//! mod harness;
//! ```

use scaleway_instance::locality::expand_id;
use scaleway_instance::provider::{Plan, Provider};
use scaleway_instance::test_support::FakeCloud;
use serde_json::Value;

/// In-memory cloud with a registry bound to it.
pub struct Harness {
    pub cloud: FakeCloud,
    pub provider: Provider,
}

impl Harness {
    pub fn new() -> Self {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        Self { cloud, provider }
    }

    pub async fn create(&self, name: &str, config: Value) -> (String, Value) {
        let plan = self
            .provider
            .plan(name, None, config)
            .await
            .unwrap_or_else(|err| panic!("plan {name}: {err}"));
        self.provider
            .apply(name, None, Some(plan.planned))
            .await
            .unwrap_or_else(|err| panic!("create {name}: {err}"))
            .state
            .unwrap_or_else(|| panic!("{name} has no state after create"))
    }

    pub async fn plan_update(&self, name: &str, id: &str, state: &Value, config: Value) -> Plan {
        self.provider
            .plan(name, Some((id, state)), config)
            .await
            .unwrap_or_else(|err| panic!("plan {name}: {err}"))
    }

    pub async fn update(
        &self,
        name: &str,
        id: &str,
        state: &Value,
        config: Value,
    ) -> (String, Value) {
        let plan = self.plan_update(name, id, state, config).await;
        assert!(
            plan.requires_replace.is_empty(),
            "{name} unexpectedly requires replacement: {:?}",
            plan.requires_replace
        );
        self.provider
            .apply(name, Some((id, state)), Some(plan.planned))
            .await
            .unwrap_or_else(|err| panic!("update {name}: {err}"))
            .state
            .unwrap_or_else(|| panic!("{name} has no state after update"))
    }

    pub async fn destroy(&self, name: &str, id: &str, state: &Value) {
        self.provider
            .apply(name, Some((id, state)), None)
            .await
            .unwrap_or_else(|err| panic!("destroy {name}: {err}"));
    }
}

/// Identifier without its locality prefix.
pub fn bare(id: &str) -> &str {
    expand_id(id)
}
