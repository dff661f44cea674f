//! Extraction and validation of structured model replies.
//!
//! Models wrap JSON in prose, code fences or reasoning blocks. Replies are
//! reduced to the first JSON object, checked against a JSON Schema
//! (Draft 2020-12), then deserialized.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::types::{Plan, ReviewDecision};

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");
const REVIEW_DECISION_SCHEMA: &str = include_str!("../../schemas/review_decision.schema.json");

static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced json regex should be valid")
});
static THINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("think block regex should be valid")
});

/// Return the JSON object embedded in `raw`, if any.
///
/// Prefers a fenced block; otherwise takes the span from the first `{` to the
/// last `}` after removing `<think>` blocks.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON_RE.captures(raw) {
        return caps.get(1).map(|m| m.as_str());
    }
    let body = match THINK_RE.find_iter(raw).last() {
        Some(m) => &raw[m.end()..],
        None => raw,
    };
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

/// Parse a planner reply into a renumbered `Plan`.
pub fn parse_plan(raw: &str) -> Result<Plan> {
    let mut plan: Plan = parse_with_schema(raw, PLAN_SCHEMA).context("parse plan")?;
    plan.renumber();
    Ok(plan)
}

/// Parse a reviewer reply into a `ReviewDecision`.
pub fn parse_review_decision(raw: &str) -> Result<ReviewDecision> {
    parse_with_schema(raw, REVIEW_DECISION_SCHEMA).context("parse review decision")
}

fn parse_with_schema<T: DeserializeOwned>(raw: &str, schema_raw: &str) -> Result<T> {
    let json = extract_json_object(raw).ok_or_else(|| anyhow!("no JSON object in reply"))?;
    let instance: Value = serde_json::from_str(json).context("reply is not valid JSON")?;
    let schema: Value = serde_json::from_str(schema_raw).context("parse schema json")?;
    validate_schema(&instance, &schema)?;
    serde_json::from_value(instance).context("deserialize reply")
}

/// Validate JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::NextAction;

    #[test]
    fn extracts_fenced_json() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json_object(raw), Some("{\"a\": 1}"));
    }

    #[test]
    fn extracts_bare_json_after_think_block() {
        let raw = "<think>maybe {not this}</think> ok {\"b\": {\"c\": 2}} done";
        assert_eq!(extract_json_object(raw), Some("{\"b\": {\"c\": 2}}"));
    }

    #[test]
    fn no_object_yields_none() {
        assert_eq!(extract_json_object("I cannot help with that."), None);
    }

    #[test]
    fn parse_plan_renumbers_steps() {
        let raw = r#"{"steps":[
            {"step_number": 7, "objective": "list", "tools_needed": ["list_directory_tool"]},
            {"objective": "write", "action": "create file"}
        ]}"#;
        let plan = parse_plan(raw).expect("plan");
        let numbers: Vec<u32> = plan.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(plan.steps[0].tools_needed, vec!["list_directory_tool"]);
    }

    #[test]
    fn parse_plan_rejects_schema_violation() {
        let err = parse_plan(r#"{"steps":[{"action":"no objective"}]}"#).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn parse_review_decision_reads_next_action() {
        let raw = r#"{"step_completed": false, "next_action": "retry", "reason": "file missing"}"#;
        let decision = parse_review_decision(raw).expect("decision");
        assert!(!decision.step_completed);
        assert_eq!(decision.next_action, NextAction::Retry);
        assert_eq!(decision.reason, "file missing");
    }

    #[test]
    fn parse_review_decision_rejects_unknown_action() {
        let raw = r#"{"step_completed": true, "next_action": "celebrate"}"#;
        assert!(parse_review_decision(raw).is_err());
    }
}
