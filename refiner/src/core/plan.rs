//! Planner output parsing.
//!
//! A planner response is accepted only if it contains a JSON object that
//! validates against `schemas/plan.schema.json` and deserializes into a
//! [`Plan`]. Anything else is rejected before any executor can see it.

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::normalize::extract_json_object;
use crate::core::types::Plan;

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Parse raw planner text into a validated [`Plan`].
pub fn parse_plan(raw: &str) -> Result<Plan> {
    let object = extract_json_object(raw)
        .ok_or_else(|| anyhow!("planner output contains no JSON object"))?;
    let value = Value::Object(object);
    validate_plan_value(&value)?;
    serde_json::from_value(value).context("deserialize plan")
}

fn validate_plan_value(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid plan schema: {}", err))?;
    if compiled.is_valid(value) {
        return Ok(());
    }
    let messages = compiled
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    Err(anyhow!("plan schema validation failed: {}", messages.join("; ")))
}
