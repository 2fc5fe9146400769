/// Frame bypass: session rules that strip frame-blocking response headers
/// for a site while it is embedded in the side panel

use crate::error::{LauncherError, LauncherResult};
use crate::site::host_of;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// First rule id handed out; lower ids are left for static rulesets
const FIRST_RULE_ID: u32 = 1_000;

const STRIPPED_HEADERS: [&str; 3] = [
    "x-frame-options",
    "content-security-policy",
    "content-security-policy-report-only",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderRemoval {
    pub header: String,
    pub operation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub response_headers: Vec<HeaderRemoval>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default)]
    pub request_domains: Vec<String>,
    #[serde(default)]
    pub resource_types: Vec<String>,
}

/// chrome.declarativeNetRequest rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnrRule {
    pub id: u32,
    #[serde(default)]
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl DnrRule {
    fn strip_frame_headers(id: u32, host: &str) -> Self {
        DnrRule {
            id,
            priority: 1,
            action: RuleAction {
                kind: "modifyHeaders".to_string(),
                response_headers: STRIPPED_HEADERS
                    .iter()
                    .map(|h| HeaderRemoval {
                        header: h.to_string(),
                        operation: "remove".to_string(),
                    })
                    .collect(),
            },
            condition: RuleCondition {
                request_domains: vec![host.to_string()],
                resource_types: vec!["sub_frame".to_string()],
            },
        }
    }
}

/// Arguments for `updateSessionRules`
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub add_rules: Vec<DnrRule>,
    pub remove_rule_ids: Vec<u32>,
}

impl RuleUpdate {
    pub fn is_empty(&self) -> bool {
        self.add_rules.is_empty() && self.remove_rule_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveRule {
    rule_id: u32,
    refs: usize,
}

/// One rule per host, reference counted across overlapping enables
#[derive(Debug)]
pub struct FrameBypassRules {
    next_id: u32,
    active: HashMap<String, ActiveRule>,
}

impl FrameBypassRules {
    pub fn new() -> Self {
        FrameBypassRules {
            next_id: FIRST_RULE_ID,
            active: HashMap::new(),
        }
    }

    /// Rebuild the table from `getSessionRules()` after the worker restarted.
    ///
    /// Session rules outlive the worker, so a site embedded before the
    /// restart still has its rule. Each restored host counts one reference.
    pub fn from_session_rules(rules: &[DnrRule]) -> Self {
        let mut table = FrameBypassRules::new();
        for rule in rules.iter().filter(|r| r.id >= FIRST_RULE_ID && r.action.kind == "modifyHeaders") {
            for host in &rule.condition.request_domains {
                table.active.insert(
                    host.clone(),
                    ActiveRule {
                        rule_id: rule.id,
                        refs: 1,
                    },
                );
            }
            table.next_id = table.next_id.max(rule.id.saturating_add(1));
        }
        if !table.active.is_empty() {
            log::info!("restored {} frame bypass rule(s)", table.active.len());
        }
        table
    }

    pub fn enable(&mut self, url: &str) -> LauncherResult<RuleUpdate> {
        let host = host_of(url).ok_or_else(|| LauncherError::InvalidUrl(url.to_string()))?;

        if let Some(rule) = self.active.get_mut(&host) {
            rule.refs += 1;
            return Ok(RuleUpdate::default());
        }

        let rule_id = self.next_id;
        self.next_id += 1;
        self.active.insert(host.clone(), ActiveRule { rule_id, refs: 1 });
        log::debug!("frame bypass rule {} for {}", rule_id, host);

        Ok(RuleUpdate {
            // clear any stale rule left under the same id by a previous worker
            remove_rule_ids: vec![rule_id],
            add_rules: vec![DnrRule::strip_frame_headers(rule_id, &host)],
        })
    }

    pub fn disable(&mut self, url: &str) -> LauncherResult<RuleUpdate> {
        let host = host_of(url).ok_or_else(|| LauncherError::InvalidUrl(url.to_string()))?;

        let Some(rule) = self.active.get_mut(&host) else {
            return Ok(RuleUpdate::default());
        };
        rule.refs -= 1;
        if rule.refs > 0 {
            return Ok(RuleUpdate::default());
        }

        let rule_id = rule.rule_id;
        self.active.remove(&host);
        Ok(RuleUpdate {
            add_rules: Vec::new(),
            remove_rule_ids: vec![rule_id],
        })
    }

    pub fn is_active(&self, url: &str) -> bool {
        host_of(url).is_some_and(|host| self.active.contains_key(&host))
    }
}

impl Default for FrameBypassRules {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_builds_rule() {
        let mut rules = FrameBypassRules::new();

        let update = rules.enable("https://Docs.Example.com/path").unwrap();

        assert_eq!(update.add_rules.len(), 1);
        let rule = &update.add_rules[0];
        assert_eq!(rule.id, FIRST_RULE_ID);
        assert_eq!(rule.condition.request_domains, vec!["docs.example.com"]);
        assert_eq!(rule.condition.resource_types, vec!["sub_frame"]);
        assert_eq!(update.remove_rule_ids, vec![FIRST_RULE_ID]);
        assert!(rules.is_active("https://docs.example.com/other"));
    }

    #[test]
    fn test_rule_json_shape() {
        let mut rules = FrameBypassRules::new();
        let update = rules.enable("https://example.com").unwrap();

        let value = serde_json::to_value(&update).unwrap();

        assert_eq!(value["addRules"][0]["action"]["type"], "modifyHeaders");
        assert_eq!(
            value["addRules"][0]["action"]["responseHeaders"][0],
            serde_json::json!({"header": "x-frame-options", "operation": "remove"})
        );
        assert_eq!(value["addRules"][0]["condition"]["requestDomains"][0], "example.com");
        assert_eq!(value["removeRuleIds"][0], FIRST_RULE_ID);
    }

    #[test]
    fn test_reference_counting() {
        let mut rules = FrameBypassRules::new();

        rules.enable("https://example.com/a").unwrap();
        assert!(rules.enable("https://example.com/b").unwrap().is_empty());

        assert!(rules.disable("https://example.com/a").unwrap().is_empty());
        assert!(rules.is_active("https://example.com/"));

        let update = rules.disable("https://example.com/b").unwrap();
        assert_eq!(update.remove_rule_ids, vec![FIRST_RULE_ID]);
        assert!(update.add_rules.is_empty());
        assert!(!rules.is_active("https://example.com/"));
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut rules = FrameBypassRules::new();

        rules.enable("https://a.example").unwrap();
        rules.disable("https://a.example").unwrap();
        let update = rules.enable("https://b.example").unwrap();

        assert_eq!(update.add_rules[0].id, FIRST_RULE_ID + 1);
    }

    #[test]
    fn test_disable_unknown_host_is_noop() {
        let mut rules = FrameBypassRules::new();
        assert!(rules.disable("https://never.example").unwrap().is_empty());
    }

    #[test]
    fn test_disable_after_worker_restart() {
        let mut before = FrameBypassRules::new();
        let installed = before.enable("https://example.com/inbox").unwrap().add_rules;

        // the worker idled out; only the browser's session rules remain
        let mut after = FrameBypassRules::from_session_rules(&installed);
        assert!(after.is_active("https://example.com/"));

        let update = after.disable("https://example.com/inbox").unwrap();
        assert_eq!(update.remove_rule_ids, vec![FIRST_RULE_ID]);
        assert!(!after.is_active("https://example.com/"));
    }

    #[test]
    fn test_restored_ids_not_reused() {
        let installed: Vec<DnrRule> = serde_json::from_value(serde_json::json!([{
            "id": 1004,
            "priority": 1,
            "action": {"type": "modifyHeaders", "responseHeaders": [{"header": "x-frame-options", "operation": "remove"}]},
            "condition": {"requestDomains": ["docs.example.com"], "resourceTypes": ["sub_frame"]}
        }]))
        .unwrap();

        let mut rules = FrameBypassRules::from_session_rules(&installed);
        let update = rules.enable("https://other.example").unwrap();

        assert_eq!(update.add_rules[0].id, 1_005);
        assert!(rules.enable("https://docs.example.com/").unwrap().is_empty());
    }

    #[test]
    fn test_restore_ignores_foreign_rules() {
        let installed: Vec<DnrRule> = serde_json::from_value(serde_json::json!([
            {"id": 7, "action": {"type": "block"}, "condition": {"requestDomains": ["ads.example"]}}
        ]))
        .unwrap();

        let rules = FrameBypassRules::from_session_rules(&installed);

        assert!(!rules.is_active("https://ads.example/"));
        assert_eq!(rules.next_id, FIRST_RULE_ID);
    }

    #[test]
    fn test_invalid_url() {
        let mut rules = FrameBypassRules::new();
        assert!(rules.enable("not a url").is_err());
        assert!(rules.disable("").is_err());
    }
}
