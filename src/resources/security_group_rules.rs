//! `scaleway_instance_security_group_rules`.
//!
//! Owns the editable rules of a group created with `external_rules`. The
//! resource id is the zoned id of the group.

use tracing::info;

use crate::locality::{expand_id, new_zoned_id, parse_zoned_id_lenient};
use crate::provider::{
    Attribute, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema, Validation,
};
use crate::scaleway::RuleDirection;
use crate::security_group::{
    expand_rules, read_rules_into, reconcile_security_group_rules, rule_block,
};

use super::{found, locate};

/// `scaleway_instance_security_group_rules`.
pub struct SecurityGroupRulesResource;

impl Resource for SecurityGroupRulesResource {
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::string("security_group_id")
                .required()
                .force_new()
                .validate(Validation::ZonedUuid),
            rule_block("inbound_rule"),
            rule_block("outbound_rule"),
        ])
    }

    fn create<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(create(meta, data))
    }

    fn read<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(read(meta, data))
    }

    fn update<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(update(meta, data))
    }

    fn delete<'a>(&'a self, meta: &'a Meta, data: &'a mut ResourceData) -> ResourceFuture<'a> {
        Box::pin(delete(meta, data))
    }
}

async fn apply_rules(meta: &Meta, data: &ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let inbound = expand_rules(data, RuleDirection::Inbound)?;
    let outbound = expand_rules(data, RuleDirection::Outbound)?;
    reconcile_security_group_rules(meta, zone, &id, &inbound, &outbound).await?;
    Ok(())
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let group = data.get_string("security_group_id");
    let zone = match parse_zoned_id_lenient(&group)? {
        (Some(zone), _) => zone,
        (None, _) => meta.zone_of(data)?,
    };
    data.set_id(new_zoned_id(zone, expand_id(&group)));
    apply_rules(meta, data).await?;
    read(meta, data).await
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    if found(meta.instance.get_security_group(zone, &id).await, data)?.is_none() {
        return Ok(());
    }
    data.set("security_group_id", new_zoned_id(zone, &id));
    read_rules_into(meta, zone, &id, data).await
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    if data.has_changes(&["inbound_rule", "outbound_rule"]) {
        apply_rules(meta, data).await?;
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    match reconcile_security_group_rules(meta, zone, &id, &[], &[]).await {
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err),
        Ok(_) => {
            info!(%zone, security_group_id = %id, "security group rules cleared");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use crate::provider::Provider;
    use crate::scaleway::RuleAction;
    use crate::test_support::FakeCloud;

    const RULES: &str = "scaleway_instance_security_group_rules";

    async fn create(provider: &Provider, name: &str, config: Value) -> (String, Value) {
        let plan = provider.plan(name, None, config).await.expect("plan");
        provider
            .apply(name, None, Some(plan.planned))
            .await
            .expect("apply")
            .state
            .expect("state")
    }

    async fn external_group(provider: &Provider) -> String {
        create(
            provider,
            "scaleway_instance_security_group",
            json!({"external_rules": true}),
        )
        .await
        .0
    }

    #[rstest]
    #[tokio::test]
    async fn prepended_rule_shifts_positions() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let group = external_group(&provider).await;
        let config = json!({
            "security_group_id": group,
            "inbound_rule": [
                {"action": "accept", "port": 80},
                {"action": "drop", "port": 443},
            ],
        });
        let (id, state) = create(&provider, RULES, config).await;
        assert_eq!(id, group);

        let config = json!({
            "security_group_id": group,
            "inbound_rule": [
                {"action": "drop", "port": 80, "ip_range": "8.8.8.8/32"},
                {"action": "accept", "port": 80},
                {"action": "drop", "port": 443},
            ],
        });
        let plan = provider
            .plan(RULES, Some((&id, &state)), config)
            .await
            .expect("plan");
        provider
            .apply(RULES, Some((&id, &state)), Some(plan.planned))
            .await
            .expect("update");

        let rules = cloud.rules(group.trim_start_matches("fr-par-1/"));
        let summary: Vec<(u32, RuleAction, String, Option<u32>)> = rules
            .iter()
            .map(|rule| (rule.position, rule.action, rule.ip_range.clone(), rule.dest_port_from))
            .collect();
        assert_eq!(
            summary,
            [
                (1, RuleAction::Drop, String::from("8.8.8.8/32"), Some(80)),
                (2, RuleAction::Accept, String::from("0.0.0.0/0"), Some(80)),
                (3, RuleAction::Drop, String::from("0.0.0.0/0"), Some(443)),
            ]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn delete_clears_the_rules() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let group = external_group(&provider).await;
        let config = json!({
            "security_group_id": group,
            "outbound_rule": [{"action": "drop", "protocol": "UDP", "port": 53}],
        });
        let (id, state) = create(&provider, RULES, config).await;

        provider
            .apply(RULES, Some((&id, &state)), None)
            .await
            .expect("delete");

        assert!(cloud.rules(group.trim_start_matches("fr-par-1/")).is_empty());
    }
}
