use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Code,
    Reflection,
}

/// A condition a `Rule` is gated on. Kept deliberately small — the rubric is
/// authored externally (§6.4); the core only needs to evaluate it, not
/// express arbitrary logic.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum Condition {
    /// Matches when the section's completion fraction is at least `value`.
    CompletionAtLeast(f64),
    /// Matches unconditionally (used for a catch-all, lowest-priority rule).
    Always,
}

impl Condition {
    pub fn matches(&self, completion_fraction: f64) -> bool {
        match self {
            Condition::CompletionAtLeast(threshold) => completion_fraction >= *threshold,
            Condition::Always => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rule {
    pub id: String,
    pub section_id: String,
    pub condition: Condition,
    pub multiplier: f64,
    pub priority: i32,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RubricSection {
    pub id: String,
    pub name: String,
    pub weight_fraction: f64,
    #[serde(default)]
    pub required_variables: HashSet<String>,
    #[serde(default)]
    pub required_functions: HashSet<String>,
    #[serde(default)]
    pub required_columns: HashSet<String>,
    pub kind: SectionKind,
    pub points: f64,
    /// Reflection-only: minimum word count per answer (default 50).
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    /// Reflection-only: expected answer ids for this section.
    #[serde(default)]
    pub expected_reflections: Vec<String>,
}

fn default_min_words() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rubric {
    pub assignment_id: String,
    pub total_points: f64,
    pub sections: Vec<RubricSection>,
    pub partial_credit_rules: Vec<Rule>,
}

impl Rubric {
    /// §6.4: weights sum to 1.0, section ids unique.
    pub fn validate(&self) -> Result<(), String> {
        if self.sections.is_empty() {
            return Err("rubric has no sections".to_string());
        }

        let mut ids = HashSet::new();
        for section in &self.sections {
            if !ids.insert(&section.id) {
                return Err(format!("duplicate section id: {}", section.id));
            }
        }

        let weight_sum: f64 = self.sections.iter().map(|s| s.weight_fraction).sum();
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(format!("section weights must sum to 1.0, got {}", weight_sum));
        }

        if self.total_points <= 0.0 {
            return Err("total_points must be positive".to_string());
        }

        for rule in &self.partial_credit_rules {
            if !ids.contains(&rule.section_id) {
                return Err(format!(
                    "partial credit rule {} references unknown section {}",
                    rule.id, rule.section_id
                ));
            }
        }

        Ok(())
    }

    pub fn section(&self, id: &str) -> Option<&RubricSection> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Rules for one section, ordered by §4.4's tie-break: ascending
    /// priority, then descending multiplier, then lexicographic id.
    pub fn rules_for_section(&self, section_id: &str) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> =
            self.partial_credit_rules.iter().filter(|r| r.section_id == section_id).collect();
        rules.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.multiplier.partial_cmp(&a.multiplier).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.id.cmp(&b.id))
        });
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, weight: f64) -> RubricSection {
        RubricSection {
            id: id.to_string(),
            name: id.to_string(),
            weight_fraction: weight,
            required_variables: HashSet::new(),
            required_functions: HashSet::new(),
            required_columns: HashSet::new(),
            kind: SectionKind::Code,
            points: 10.0,
            min_words: 50,
            expected_reflections: vec![],
        }
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let rubric = Rubric {
            assignment_id: "hw1".to_string(),
            total_points: 20.0,
            sections: vec![section("a", 0.4), section("b", 0.4)],
            partial_credit_rules: vec![],
        };
        assert!(rubric.validate().is_err());
    }

    #[test]
    fn accepts_closed_weights() {
        let rubric = Rubric {
            assignment_id: "hw1".to_string(),
            total_points: 20.0,
            sections: vec![section("a", 0.5), section("b", 0.5)],
            partial_credit_rules: vec![],
        };
        assert!(rubric.validate().is_ok());
    }

    #[test]
    fn tie_break_prefers_lower_priority_then_higher_multiplier_then_id() {
        let rubric = Rubric {
            assignment_id: "hw1".to_string(),
            total_points: 10.0,
            sections: vec![section("a", 1.0)],
            partial_credit_rules: vec![
                Rule {
                    id: "z".to_string(),
                    section_id: "a".to_string(),
                    condition: Condition::Always,
                    multiplier: 0.5,
                    priority: 1,
                    explanation: String::new(),
                },
                Rule {
                    id: "b".to_string(),
                    section_id: "a".to_string(),
                    condition: Condition::Always,
                    multiplier: 0.7,
                    priority: 1,
                    explanation: String::new(),
                },
            ],
        };
        let rules = rubric.rules_for_section("a");
        assert_eq!(rules[0].id, "b");
    }
}
