//! Oracle personas, built from config and injected into the loop.

use std::collections::BTreeMap;

use crate::io::config::PersonasConfig;

const PLANNER_INSTRUCTIONS: &str = include_str!("prompts/personas/planner.md");
const AUDITOR_INSTRUCTIONS: &str = include_str!("prompts/personas/auditor.md");
const PROGRAMMER_INSTRUCTIONS: &str = include_str!("prompts/personas/programmer.md");
const ENGINEER_INSTRUCTIONS: &str = include_str!("prompts/personas/engineer.md");
const REPORTER_INSTRUCTIONS: &str = include_str!("prompts/personas/reporter.md");
const CODE_ANALYST_INSTRUCTIONS: &str = include_str!("prompts/personas/code_analyst.md");
const SECURITY_REVIEW_INSTRUCTIONS: &str = include_str!("prompts/personas/security_review.md");

const AUDIT_VERDICT_SCHEMA: &str = include_str!("../../schemas/audit_verdict.schema.json");
const SPECIALIST_OUTPUT_SCHEMA: &str = include_str!("../../schemas/specialist_output.schema.json");

/// A named role the oracle answers as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub instructions: String,
    /// JSON Schema constraining the answer, for backends that support it.
    pub output_schema: Option<&'static str>,
}

impl Persona {
    fn new(name: &str, instructions: &str, output_schema: Option<&'static str>) -> Self {
        Self {
            name: name.to_string(),
            instructions: instructions.trim().to_string(),
            output_schema,
        }
    }
}

/// Every persona one loop run may consult.
#[derive(Debug, Clone)]
pub struct Personas {
    pub planner: Persona,
    pub auditor: Persona,
    pub programmer: Persona,
    pub engineer: Persona,
    pub reporter: Persona,
    specialists: BTreeMap<String, Persona>,
}

impl Personas {
    pub fn from_config(config: &PersonasConfig) -> Self {
        let specialists = config
            .specialists
            .iter()
            .map(|(name, instructions)| {
                (
                    name.clone(),
                    Persona::new(name, instructions, Some(SPECIALIST_OUTPUT_SCHEMA)),
                )
            })
            .collect();
        Self {
            // The plan schema branches with `if`/`then`, which strict output
            // schemas reject; `parse_plan` validates planner replies locally.
            planner: Persona::new("planner", PLANNER_INSTRUCTIONS, None),
            auditor: Persona::new("auditor", AUDITOR_INSTRUCTIONS, Some(AUDIT_VERDICT_SCHEMA)),
            programmer: Persona::new("programmer", PROGRAMMER_INSTRUCTIONS, None),
            engineer: Persona::new("engineer", ENGINEER_INSTRUCTIONS, None),
            reporter: Persona::new("reporter", REPORTER_INSTRUCTIONS, None),
            specialists,
        }
    }

    pub fn specialist(&self, name: &str) -> Option<&Persona> {
        self.specialists.get(name)
    }

    /// Specialist names in sorted order.
    pub fn specialist_names(&self) -> Vec<&str> {
        self.specialists.keys().map(String::as_str).collect()
    }
}

impl Default for Personas {
    fn default() -> Self {
        Self::from_config(&PersonasConfig::default())
    }
}

/// Specialists available when the config names none.
pub fn default_specialists() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "CodeAnalystAgent".to_string(),
            CODE_ANALYST_INSTRUCTIONS.trim().to_string(),
        ),
        (
            "SecurityReviewAgent".to_string(),
            SECURITY_REVIEW_INSTRUCTIONS.trim().to_string(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_builtin_specialists() {
        let personas = Personas::default();
        assert_eq!(
            personas.specialist_names(),
            ["CodeAnalystAgent", "SecurityReviewAgent"]
        );
        assert!(personas.specialist("CodeAnalystAgent").is_some());
        assert!(personas.specialist("Nobody").is_none());
    }

    #[test]
    fn configured_specialists_replace_defaults() {
        let config = PersonasConfig {
            specialists: BTreeMap::from([(
                "PerfAgent".to_string(),
                "You profile code.".to_string(),
            )]),
        };
        let personas = Personas::from_config(&config);
        assert_eq!(personas.specialist_names(), ["PerfAgent"]);
        let perf = personas.specialist("PerfAgent").expect("perf");
        assert!(perf.output_schema.is_some());
    }

    #[test]
    fn only_structured_personas_carry_output_schemas() {
        let personas = Personas::default();
        assert_eq!(personas.auditor.output_schema, Some(AUDIT_VERDICT_SCHEMA));
        for persona in [
            &personas.planner,
            &personas.programmer,
            &personas.engineer,
            &personas.reporter,
        ] {
            assert!(persona.output_schema.is_none(), "{}", persona.name);
        }
    }

    #[test]
    fn embedded_schemas_are_valid_json() {
        for schema in [AUDIT_VERDICT_SCHEMA, SPECIALIST_OUTPUT_SCHEMA] {
            serde_json::from_str::<serde_json::Value>(schema).expect("schema json");
        }
    }
}
