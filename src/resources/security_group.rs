//! `scaleway_instance_security_group`.
//!
//! Rules are managed on the group itself unless `external_rules` is set,
//! in which case a `scaleway_instance_security_group_rules` resource owns
//! them and this resource neither reads nor writes them.

use tracing::info;

use crate::locality::new_zoned_id;
use crate::provider::{
    Attribute, Meta, ProviderError, Resource, ResourceData, ResourceFuture, Schema, Validation,
};
use crate::scaleway::{
    CreateSecurityGroupRequest, RuleAction, RuleDirection, SecurityGroup,
    UpdateSecurityGroupRequest,
};
use crate::security_group::{
    Rule, expand_rules, read_rules_into, reconcile_security_group_rules, rule_block,
};

use super::{
    changed_name, changed_tags, found, locality_attributes, locate, name_or_generate, parse_enum,
    set_locality, string_array, tolerate_not_found,
};

/// `scaleway_instance_security_group`.
pub struct SecurityGroupResource;

fn policy_attribute(name: &'static str) -> Attribute {
    Attribute::string(name)
        .default_value("accept")
        .validate(Validation::OneOf(&["accept", "drop"]))
}

impl Resource for SecurityGroupResource {
    fn schema(&self) -> Schema {
        let mut attributes = vec![
            Attribute::string("name").computed(),
            Attribute::string("description"),
            Attribute::bool("stateful").default_value(true),
            policy_attribute("inbound_default_policy"),
            policy_attribute("outbound_default_policy"),
            Attribute::bool("enable_default_security").default_value(true),
            Attribute::bool("external_rules").default_value(false),
            rule_block("inbound_rule"),
            rule_block("outbound_rule"),
            Attribute::list("tags"),
            Attribute::bool("project_default").computed_only(),
        ];
        attributes.extend(locality_attributes());
        Schema::new(attributes)
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

fn policy(data: &ResourceData, path: &str) -> Result<RuleAction, ProviderError> {
    Ok(parse_enum(data, path, RuleAction::parse)?.unwrap_or(RuleAction::Accept))
}

fn manages_rules(data: &ResourceData) -> bool {
    !data.get_bool("external_rules")
}

/// Parses the configured rules, which only a group managing its own
/// rules may carry.
fn configured_rules(data: &ResourceData) -> Result<(Vec<Rule>, Vec<Rule>), ProviderError> {
    let inbound = expand_rules(data, RuleDirection::Inbound)?;
    let outbound = expand_rules(data, RuleDirection::Outbound)?;
    if !manages_rules(data) && !(inbound.is_empty() && outbound.is_empty()) {
        return Err(ProviderError::validation(
            "external_rules",
            "inbound_rule and outbound_rule cannot be set when external_rules is true",
        ));
    }
    Ok((inbound, outbound))
}

async fn create(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let zone = meta.zone_of(data)?;
    let (inbound, outbound) = configured_rules(data)?;
    let request = CreateSecurityGroupRequest {
        name: name_or_generate(data, "sg"),
        description: data.get_string("description"),
        project: meta.project_of(data),
        stateful: data.get_bool_opt("stateful").unwrap_or(true),
        inbound_default_policy: policy(data, "inbound_default_policy")?,
        outbound_default_policy: policy(data, "outbound_default_policy")?,
        enable_default_security: data.get_bool_opt("enable_default_security").unwrap_or(true),
        tags: data.get_string_list("tags"),
    };
    let created = meta.instance.create_security_group(zone, &request).await?;
    data.set_id(new_zoned_id(zone, &created.id));
    info!(%zone, security_group_id = %created.id, "security group created");

    if manages_rules(data) {
        reconcile_security_group_rules(meta, zone, &created.id, &inbound, &outbound).await?;
    }
    read(meta, data).await
}

async fn read(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let Some(group) = found(meta.instance.get_security_group(zone, &id).await, data)? else {
        return Ok(());
    };
    flatten_security_group(data, &group);
    if manages_rules(data) {
        read_rules_into(meta, zone, &id, data).await?;
    }
    Ok(())
}

/// Writes the group attributes, rules excluded, into `data`.
pub(crate) fn flatten_security_group(data: &mut ResourceData, group: &SecurityGroup) {
    data.set("name", group.name.as_str());
    data.set(
        "description",
        (!group.description.is_empty()).then(|| group.description.clone()),
    );
    data.set("stateful", group.stateful);
    data.set("inbound_default_policy", group.inbound_default_policy.as_str());
    data.set("outbound_default_policy", group.outbound_default_policy.as_str());
    data.set("enable_default_security", group.enable_default_security);
    data.set("project_default", group.project_default);
    data.set("tags", string_array(group.tags.iter().cloned()));
    set_locality(data, group.zone, &group.project);
}

fn group_changes(data: &ResourceData) -> Result<UpdateSecurityGroupRequest, ProviderError> {
    let mut request = UpdateSecurityGroupRequest {
        name: changed_name(data),
        tags: changed_tags(data),
        ..UpdateSecurityGroupRequest::default()
    };
    if data.has_change("description") {
        request.description = Some(data.get_string("description"));
    }
    if data.has_change("stateful") {
        request.stateful = Some(data.get_bool("stateful"));
    }
    if data.has_change("inbound_default_policy") {
        request.inbound_default_policy = Some(policy(data, "inbound_default_policy")?);
    }
    if data.has_change("outbound_default_policy") {
        request.outbound_default_policy = Some(policy(data, "outbound_default_policy")?);
    }
    if data.has_change("enable_default_security") {
        request.enable_default_security = Some(data.get_bool("enable_default_security"));
    }
    Ok(request)
}

const fn is_empty(request: &UpdateSecurityGroupRequest) -> bool {
    request.name.is_none()
        && request.description.is_none()
        && request.stateful.is_none()
        && request.inbound_default_policy.is_none()
        && request.outbound_default_policy.is_none()
        && request.enable_default_security.is_none()
        && request.tags.is_none()
}

async fn update(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    let (inbound, outbound) = configured_rules(data)?;
    let request = group_changes(data)?;
    if !is_empty(&request) {
        meta.instance
            .update_security_group(zone, &id, &request)
            .await?;
    }
    if manages_rules(data) {
        reconcile_security_group_rules(meta, zone, &id, &inbound, &outbound).await?;
    }
    read(meta, data).await
}

async fn delete(meta: &Meta, data: &mut ResourceData) -> Result<(), ProviderError> {
    let (zone, id) = locate(meta, data)?;
    tolerate_not_found(meta.instance.delete_security_group(zone, &id).await)?;
    info!(%zone, security_group_id = %id, "security group deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use crate::provider::Provider;
    use crate::scaleway::RuleDirection;
    use crate::test_support::FakeCloud;

    const GROUP: &str = "scaleway_instance_security_group";

    async fn create(provider: &Provider, config: Value) -> (String, Value) {
        let plan = provider.plan(GROUP, None, config).await.expect("plan");
        provider
            .apply(GROUP, None, Some(plan.planned))
            .await
            .expect("apply")
            .state
            .expect("state")
    }

    fn bare(id: &str) -> &str {
        id.rsplit('/').next().unwrap_or(id)
    }

    #[rstest]
    #[tokio::test]
    async fn rules_are_written_in_one_call() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();

        let (id, state) = create(
            &provider,
            json!({
                "inbound_rule": [
                    {"action": "accept", "port": 22},
                    {"action": "accept", "port_range": "8000-8080"},
                ],
                "outbound_rule": [{"action": "drop", "ip": "10.0.0.1"}],
            }),
        )
        .await;

        let rules = cloud.rules(bare(&id));
        assert_eq!(cloud.calls_matching("set_security_group_rules").len(), 1);
        assert_eq!(rules.len(), 3);
        assert_eq!(
            rules.iter().map(|rule| rule.position).collect::<Vec<_>>(),
            [1, 2, 3]
        );
        assert_eq!(rules.last().map(|rule| rule.direction), Some(RuleDirection::Outbound));
        assert_eq!(state["inbound_rule"][1]["port_range"], json!("8000-8080"));
        assert_eq!(state["outbound_rule"][0]["ip"], json!("10.0.0.1"));
    }

    #[rstest]
    #[tokio::test]
    async fn unchanged_rules_are_not_rewritten() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();
        let config = json!({"name": "web", "inbound_rule": [{"action": "accept", "port": 443}]});
        let (id, state) = create(&provider, config).await;
        cloud.clear_calls();

        let config = json!({
            "name": "web-renamed",
            "inbound_rule": [{"action": "accept", "port": 443}],
        });
        let plan = provider
            .plan(GROUP, Some((&id, &state)), config)
            .await
            .expect("plan");
        provider
            .apply(GROUP, Some((&id, &state)), Some(plan.planned))
            .await
            .expect("update");

        assert_eq!(cloud.calls_matching("update_security_group").len(), 1);
        assert!(cloud.calls_matching("set_security_group_rules").is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn external_rules_are_left_alone() {
        let cloud = FakeCloud::new();
        let provider = cloud.provider();

        let (_, state) = create(&provider, json!({"external_rules": true})).await;

        assert!(cloud.calls_matching("set_security_group_rules").is_empty());
        assert!(cloud.calls_matching("list_security_group_rules").is_empty());
        assert_eq!(state["stateful"], json!(true));
        assert_eq!(state["inbound_default_policy"], json!("accept"));
    }
}
