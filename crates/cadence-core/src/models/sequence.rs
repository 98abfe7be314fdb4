//! YAML schema types for sequence definitions.
//!
//! A sequence YAML defines an ordered engagement pipeline:
//!
//! ```yaml
//! key: "inbound-lead-followup"
//! name: "Inbound Lead Follow-up"
//! description: "Qualify an inbound lead, brief the rep, and book a meeting"
//!
//! steps:
//!   - order: 1
//!     skill_key: "enrich_company"
//!     input_mapping:
//!       domain: "${trigger.params.company_domain}"
//!     output_key: "company"
//!
//!   - order: 2
//!     action: "create_lead"
//!     input_mapping:
//!       name: "${trigger.params.lead_name}"
//!       company: "${outputs.company.name}"
//!     output_key: "lead"
//!     on_failure: continue
//!
//!   - order: 3
//!     skill_key: "send_intro_email"
//!     input_mapping:
//!       to: "${outputs.lead.email}"
//!     hitl_before:
//!       enabled: true
//!       prompt: "Approve intro email to ${outputs.lead.email}?"
//!       channels: ["slack"]
//!       timeout_minutes: 60
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::hitl::HitlConfig;

/// Top-level sequence definition loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    /// Stable key identifying the sequence (referenced by executions)
    pub key: String,

    /// Human-readable name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Ordered list of steps. `order` values must be unique; the engine
    /// sorts by `order` before executing.
    pub steps: Vec<SequenceStep>,
}

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Stop the sequence immediately (default)
    #[default]
    Stop,
    /// Continue to the next step, leaving the failure recorded
    Continue,
}

/// A single step in the sequence pipeline.
///
/// Exactly one of `skill_key` / `action` is meaningful. A `skill_key`
/// references a named reusable capability on the execution backend; an
/// `action` is a free-form capability identifier only runnable in
/// simulation or via delegated execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    /// 1-based position within the sequence
    pub order: u32,

    /// Named reusable capability
    #[serde(default)]
    pub skill_key: Option<String>,

    /// Free-form capability identifier
    #[serde(default)]
    pub action: Option<String>,

    /// Map from target input field to a variable expression string
    /// (`"${outputs.lead.email}"`) or a JSON literal.
    #[serde(default)]
    pub input_mapping: BTreeMap<String, Value>,

    /// Key under which this step's output is merged into the execution
    /// context (`outputs.<output_key>`). Falls back to the step key.
    #[serde(default)]
    pub output_key: Option<String>,

    /// What to do if this step fails
    #[serde(default)]
    pub on_failure: OnFailure,

    /// Optional human-in-the-loop gate before the step runs
    #[serde(default)]
    pub hitl_before: Option<HitlConfig>,

    /// Optional human-in-the-loop gate after the step succeeds
    #[serde(default)]
    pub hitl_after: Option<HitlConfig>,
}

impl SequenceStep {
    /// Canonical key naming this step: trimmed `skill_key`, else trimmed
    /// `action`, else `step_{order}`.
    pub fn step_key(&self) -> String {
        if let Some(skill) = self.skill_key.as_deref() {
            let skill = skill.trim();
            if !skill.is_empty() {
                return skill.to_string();
            }
        }
        if let Some(action) = self.action.as_deref() {
            let action = action.trim();
            if !action.is_empty() {
                return action.to_string();
            }
        }
        format!("step_{}", self.order)
    }

    /// Key under which this step's output lands in `outputs`.
    pub fn output_key(&self) -> String {
        match self.output_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => self.step_key(),
        }
    }
}

impl Sequence {
    /// Parse a sequence definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        let seq: Sequence = serde_yaml::from_str(yaml)
            .map_err(|e| format!("Failed to parse sequence YAML: {}", e))?;
        seq.validate()?;
        Ok(seq)
    }

    /// Load a sequence definition from a file path.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read sequence file '{}': {}", path, e))?;
        Self::from_yaml(&content)
    }

    /// Steps sorted by `order` (the executor always runs in this order).
    pub fn ordered_steps(&self) -> Vec<&SequenceStep> {
        let mut steps: Vec<&SequenceStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.order) {
                return Err(format!(
                    "Duplicate step order {} in sequence '{}'",
                    step.order, self.key
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_sequence() {
        let yaml = r#"
key: "test-flow"
name: "Test Flow"
steps:
  - order: 1
    skill_key: "enrich_company"
"#;
        let seq = Sequence::from_yaml(yaml).unwrap();
        assert_eq!(seq.key, "test-flow");
        assert_eq!(seq.steps.len(), 1);
        assert_eq!(seq.steps[0].step_key(), "enrich_company");
        assert_eq!(seq.steps[0].on_failure, OnFailure::Stop);
    }

    #[test]
    fn test_parse_full_sequence() {
        let yaml = r#"
key: "lead-followup"
name: "Lead Follow-up"
description: "Qualify and follow up"
steps:
  - order: 2
    action: "create_lead"
    input_mapping:
      name: "${trigger.params.lead_name}"
      source: "inbound"
    output_key: "lead"
    on_failure: continue
  - order: 1
    skill_key: "enrich_company"
    input_mapping:
      domain: "${trigger.params.company_domain}"
    output_key: "company"
    hitl_after:
      enabled: true
      prompt: "Review enrichment for ${outputs.company.name}"
      channels: ["slack"]
"#;
        let seq = Sequence::from_yaml(yaml).unwrap();
        assert_eq!(seq.steps.len(), 2);

        let ordered = seq.ordered_steps();
        assert_eq!(ordered[0].order, 1);
        assert_eq!(ordered[0].output_key(), "company");
        assert_eq!(ordered[1].on_failure, OnFailure::Continue);
        assert!(ordered[0].hitl_after.as_ref().unwrap().enabled);
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let yaml = r#"
key: "dup"
name: "Dup"
steps:
  - order: 1
    skill_key: "a"
  - order: 1
    skill_key: "b"
"#;
        assert!(Sequence::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_step_key_fallbacks() {
        let step = SequenceStep {
            order: 4,
            skill_key: Some("   ".to_string()),
            action: None,
            input_mapping: Default::default(),
            output_key: None,
            on_failure: OnFailure::Stop,
            hitl_before: None,
            hitl_after: None,
        };
        assert_eq!(step.step_key(), "step_4");
        assert_eq!(step.output_key(), "step_4");
    }
}
