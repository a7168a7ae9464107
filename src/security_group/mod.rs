//! Security group rule model and reconciliation.
//!
//! Rules carry no user-supplied identity, so the provider pairs the rules
//! in state with the remote editable rules by position within each
//! direction. Content equality only detects drift; it never reorders.
//! Writes replace every editable rule of the group in one
//! `SetSecurityGroupRules` call.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::locality::Zone;
use crate::provider::{Attribute, Meta, ProviderError, ResourceData, Validation};
use crate::scaleway::{
    RuleAction, RuleDirection, RuleProtocol, SecurityGroupRule, SetSecurityGroupRule,
};

/// Range matching every IPv4 source or destination.
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// One firewall rule as the provider compares it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rule {
    /// Verdict.
    pub action: RuleAction,
    /// Matched protocol.
    pub protocol: RuleProtocol,
    /// CIDR range.
    pub ip_range: String,
    /// First destination port; `None` matches every port.
    pub port_from: Option<u32>,
    /// Last destination port.
    pub port_to: Option<u32>,
}

impl Rule {
    /// Rule accepting or dropping a single port from anywhere.
    #[must_use]
    pub fn single_port(action: RuleAction, protocol: RuleProtocol, ip_range: &str, port: u32) -> Self {
        Self {
            action,
            protocol,
            ip_range: ip_range.to_owned(),
            port_from: Some(port),
            port_to: Some(port),
        }
    }

    fn to_request(&self, direction: RuleDirection, position: u32) -> SetSecurityGroupRule {
        SetSecurityGroupRule {
            action: self.action,
            protocol: self.protocol,
            direction,
            ip_range: self.ip_range.clone(),
            dest_port_from: self.port_from,
            dest_port_to: self.port_to,
            position,
            editable: true,
        }
    }
}

impl From<&SecurityGroupRule> for Rule {
    fn from(rule: &SecurityGroupRule) -> Self {
        Self {
            action: rule.action,
            protocol: rule.protocol,
            ip_range: rule.ip_range.clone(),
            port_from: rule.dest_port_from,
            port_to: rule.dest_port_to,
        }
    }
}

/// Compares two rules, treating absent ports as port 0.
#[must_use]
pub fn rule_equals(left: &Rule, right: &Rule) -> bool {
    left.action == right.action
        && left.protocol == right.protocol
        && left.ip_range == right.ip_range
        && left.port_from.unwrap_or(0) == right.port_from.unwrap_or(0)
        && left.port_to.unwrap_or(0) == right.port_to.unwrap_or(0)
}

/// Attribute holding the rules of `direction`.
#[must_use]
pub const fn rules_attribute(direction: RuleDirection) -> &'static str {
    match direction {
        RuleDirection::Outbound => "outbound_rule",
        RuleDirection::Inbound | RuleDirection::Unknown => "inbound_rule",
    }
}

/// Nested schema of one `inbound_rule` or `outbound_rule` block.
#[must_use]
pub fn rule_block(name: &'static str) -> Attribute {
    Attribute::block(
        name,
        vec![
            Attribute::string("action")
                .required()
                .validate(Validation::OneOf(&["accept", "drop"])),
            Attribute::string("protocol")
                .default_value("TCP")
                .validate(Validation::OneOf(&["TCP", "UDP", "ICMP", "ANY"])),
            Attribute::int("port")
                .conflicts_with(&["port_range"])
                .describe("Single destination port"),
            Attribute::string("port_range").describe("Destination ports as `from-to`"),
            Attribute::string("ip")
                .conflicts_with(&["ip_range"])
                .deprecated("use ip_range instead"),
            Attribute::string("ip_range").computed(),
        ],
    )
}

#[derive(Debug, Deserialize)]
struct RuleConfig {
    action: String,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    port: Option<u32>,
    #[serde(default)]
    port_range: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    ip_range: Option<String>,
}

fn parse_port_range(field: &str, value: &str) -> Result<(u32, u32), ProviderError> {
    let invalid = || ProviderError::validation(field, format!("expected from-to, got '{value}'"));
    let (from, to) = value.split_once('-').ok_or_else(invalid)?;
    let from: u32 = from.trim().parse().map_err(|_| invalid())?;
    let to: u32 = to.trim().parse().map_err(|_| invalid())?;
    if from > to {
        return Err(invalid());
    }
    Ok((from, to))
}

/// Parses one rule block.
///
/// `port_range` is `from-to`, `port` a single port, and neither matches
/// every port. The deprecated `ip` expands to `ip/32`; an empty range
/// means every source.
///
/// # Errors
///
/// Returns [`ProviderError::Validation`] naming `field` when the block is
/// malformed.
pub fn parse_rule(field: &str, block: &Value) -> Result<Rule, ProviderError> {
    let config: RuleConfig = serde_json::from_value(block.clone())
        .map_err(|err| ProviderError::validation(field, err.to_string()))?;
    let action = RuleAction::parse(&config.action).ok_or_else(|| {
        ProviderError::validation(field, format!("unknown action '{}'", config.action))
    })?;
    let protocol_name = config.protocol.as_deref().unwrap_or("TCP");
    let protocol = RuleProtocol::parse(protocol_name).ok_or_else(|| {
        ProviderError::validation(field, format!("unknown protocol '{protocol_name}'"))
    })?;
    let (port_from, port_to) = match (config.port_range.as_deref(), config.port) {
        (Some(range), _) if !range.is_empty() => {
            let (from, to) = parse_port_range(&format!("{field}.port_range"), range)?;
            (Some(from), Some(to))
        }
        (_, Some(port)) if port > 0 => (Some(port), Some(port)),
        _ => (None, None),
    };
    let ip_range = match (config.ip.as_deref(), config.ip_range.as_deref()) {
        (Some(ip), _) if !ip.is_empty() => format!("{ip}/32"),
        (_, Some(range)) if !range.is_empty() => range.to_owned(),
        _ => ANY_IPV4.to_owned(),
    };
    Ok(Rule {
        action,
        protocol,
        ip_range,
        port_from,
        port_to,
    })
}

/// Renders a rule as a state block.
#[must_use]
pub fn flatten_rule(rule: &Rule) -> Value {
    let mut block = Map::new();
    block.insert(String::from("action"), Value::from(rule.action.as_str()));
    block.insert(String::from("protocol"), Value::from(rule.protocol.as_str()));
    block.insert(String::from("ip_range"), Value::from(rule.ip_range.clone()));
    match (rule.port_from, rule.port_to) {
        (Some(from), Some(to)) if from != to => {
            block.insert(String::from("port_range"), Value::from(format!("{from}-{to}")));
        }
        (Some(from), _) if from > 0 => {
            block.insert(String::from("port"), Value::from(from));
        }
        _ => {}
    }
    Value::Object(block)
}

/// Parses every rule block of `direction` from the working state.
///
/// # Errors
///
/// Returns [`ProviderError::Validation`] for malformed blocks.
pub fn expand_rules(data: &ResourceData, direction: RuleDirection) -> Result<Vec<Rule>, ProviderError> {
    let attribute = rules_attribute(direction);
    data.get(attribute)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, block)| parse_rule(&format!("{attribute}.{index}"), block))
        .collect()
}

/// Remote editable rules of one direction, ordered by position.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteRules {
    /// Inbound rules.
    pub inbound: Vec<Rule>,
    /// Outbound rules.
    pub outbound: Vec<Rule>,
}

impl RemoteRules {
    /// Rules of `direction`.
    #[must_use]
    pub fn of(&self, direction: RuleDirection) -> &[Rule] {
        match direction {
            RuleDirection::Outbound => &self.outbound,
            RuleDirection::Inbound | RuleDirection::Unknown => &self.inbound,
        }
    }
}

/// Fetches the editable rules of a group, sorted by position.
///
/// # Errors
///
/// Propagates API failures.
pub async fn list_editable_rules(
    meta: &Meta,
    zone: Zone,
    security_group_id: &str,
) -> Result<RemoteRules, ProviderError> {
    let mut rules = meta
        .instance
        .list_security_group_rules(zone, security_group_id)
        .await?;
    rules.retain(|rule| rule.editable);
    rules.sort_by_key(|rule| rule.position);
    let mut remote = RemoteRules::default();
    for rule in &rules {
        match rule.direction {
            RuleDirection::Outbound => remote.outbound.push(rule.into()),
            RuleDirection::Inbound | RuleDirection::Unknown => remote.inbound.push(rule.into()),
        }
    }
    Ok(remote)
}

/// State blocks for `remote`, keeping each state block whose rule is
/// equal to the remote rule at the same position.
///
/// The result has exactly one block per remote rule: state-only overflow
/// is dropped and remote-only overflow is flattened.
#[must_use]
pub fn merge_rules(state: &[Value], remote: &[Rule]) -> Vec<Value> {
    remote
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            state
                .get(index)
                .filter(|block| {
                    parse_rule("rule", block).is_ok_and(|parsed| rule_equals(&parsed, rule))
                })
                .cloned()
                .unwrap_or_else(|| flatten_rule(rule))
        })
        .collect()
}

/// Refreshes `inbound_rule` and `outbound_rule` from the remote group.
///
/// # Errors
///
/// Propagates API failures.
pub async fn read_rules_into(
    meta: &Meta,
    zone: Zone,
    security_group_id: &str,
    data: &mut ResourceData,
) -> Result<(), ProviderError> {
    let remote = list_editable_rules(meta, zone, security_group_id).await?;
    for direction in [RuleDirection::Inbound, RuleDirection::Outbound] {
        let attribute = rules_attribute(direction);
        let state = data
            .get(attribute)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let merged = merge_rules(&state, remote.of(direction));
        data.set(attribute, Value::Array(merged));
    }
    Ok(())
}

fn all_equal(left: &[Rule], right: &[Rule]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(expected, observed)| rule_equals(expected, observed))
}

/// Makes the editable rules of a group equal to `inbound` then `outbound`.
///
/// Returns `true` when a write was issued. Nothing is sent when the
/// remote rules already match pointwise.
///
/// # Errors
///
/// Propagates API failures.
pub async fn reconcile_security_group_rules(
    meta: &Meta,
    zone: Zone,
    security_group_id: &str,
    inbound: &[Rule],
    outbound: &[Rule],
) -> Result<bool, ProviderError> {
    let remote = list_editable_rules(meta, zone, security_group_id).await?;
    if all_equal(inbound, &remote.inbound) && all_equal(outbound, &remote.outbound) {
        debug!(%zone, security_group_id, "security group rules up to date");
        return Ok(false);
    }
    let requests: Vec<SetSecurityGroupRule> = inbound
        .iter()
        .map(|rule| (RuleDirection::Inbound, rule))
        .chain(outbound.iter().map(|rule| (RuleDirection::Outbound, rule)))
        .zip(1_u32..)
        .map(|((direction, rule), position)| rule.to_request(direction, position))
        .collect();
    meta.instance
        .set_security_group_rules(zone, security_group_id, &requests)
        .await?;
    info!(
        %zone,
        security_group_id,
        inbound = inbound.len(),
        outbound = outbound.len(),
        "security group rules replaced"
    );
    Ok(true)
}

#[cfg(test)]
mod tests;
