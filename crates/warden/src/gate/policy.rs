//! Typed policy table, built once at startup.

use std::collections::HashMap;

use warden_common::{ActionPolicy, WardenError};

use super::matcher::ActionMatcher;
use crate::config::ActionConfig;

/// Gated actions and their policies.
///
/// Every pattern the matcher knows has exactly one policy.
#[derive(Debug, Default, Clone)]
pub struct GatePolicies {
    matcher: ActionMatcher,
    policies: HashMap<String, ActionPolicy>,
}

impl GatePolicies {
    /// Validate the configured action table
    pub fn build(actions: &[ActionConfig]) -> Result<Self, WardenError> {
        let mut policies = HashMap::with_capacity(actions.len());

        for entry in actions {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(WardenError::Config("gated action with empty name".to_string()));
            }
            if name.strip_suffix('*').unwrap_or(name).contains('*') {
                return Err(WardenError::Config(format!(
                    "action pattern {name:?}: a single '*' is only allowed at the end"
                )));
            }

            let identifier = entry
                .identifier
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();
            if entry.max_fail_count > 0 && identifier.is_empty() {
                return Err(WardenError::Config(format!(
                    "action {name:?}: max_fail_count = {} requires an identifier field",
                    entry.max_fail_count
                )));
            }

            let policy = ActionPolicy::new(identifier, entry.max_fail_count);
            if policies.insert(name.to_string(), policy).is_some() {
                return Err(WardenError::Config(format!("action {name:?} configured twice")));
            }
        }

        Ok(Self {
            matcher: ActionMatcher::new(policies.keys()),
            policies,
        })
    }

    /// Policy governing an action, if it is gated
    pub fn lookup(&self, action: &str) -> Option<&ActionPolicy> {
        self.matcher
            .find(action)
            .and_then(|pattern| self.policies.get(pattern))
    }

    pub fn matcher(&self) -> &ActionMatcher {
        &self.matcher
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
