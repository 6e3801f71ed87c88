//! C4 — DeterministicValidator: rubric-faithful base score, no LLM calls.
//! Grounded in the same rule-priority evaluation shape used elsewhere in
//! this codebase for scoring against a table of prioritised rules.

use crate::models::{Finding, FindingKind, ParsedSubmission, Rubric, RubricSection, SectionKind};

#[derive(Debug, Clone)]
pub struct DeterministicResult {
    pub base_score: f64,
    pub findings: Vec<Finding>,
}

pub struct DeterministicValidator;

impl DeterministicValidator {
    pub fn new() -> Self {
        Self
    }

    /// §4.4 algorithm. Deterministic: identical `(rubric, submission)` pairs
    /// always produce byte-identical output.
    pub fn evaluate(&self, rubric: &Rubric, submission: &ParsedSubmission) -> DeterministicResult {
        let mut findings = Vec::new();
        let mut points_awarded_total = 0.0;

        for section in &rubric.sections {
            let (points_awarded, finding) = match section.kind {
                SectionKind::Code => self.evaluate_code_section(rubric, section, submission),
                SectionKind::Reflection => self.evaluate_reflection_section(section, submission),
            };
            points_awarded_total += points_awarded;
            findings.push(finding);
        }

        if submission.has_errors() {
            findings.push(Finding::global(
                FindingKind::Error,
                format!("submission raised {} unhandled error(s)", submission.errors_present.len()),
            ));
        }

        let base_score = if rubric.total_points > 0.0 {
            (points_awarded_total / rubric.total_points * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        DeterministicResult { base_score, findings }
    }

    fn evaluate_code_section(
        &self,
        rubric: &Rubric,
        section: &RubricSection,
        submission: &ParsedSubmission,
    ) -> (f64, Finding) {
        let fns_referenced = submission.functions_referenced();
        let cols_referenced = submission.columns_referenced();

        let vars_found = section.required_variables.intersection(&submission.required_variables_present).count();
        let fns_found = section.required_functions.intersection(&fns_referenced).count();
        let cols_found = section.required_columns.intersection(&cols_referenced).count();

        let completion_fraction = weighted_mean(&[
            fraction(vars_found, section.required_variables.len()),
            fraction(fns_found, section.required_functions.len()),
            fraction(cols_found, section.required_columns.len()),
        ]);

        let rules = rubric.rules_for_section(&section.id);
        let matching = rules.iter().find(|r| r.condition.matches(completion_fraction));
        let credit = match matching {
            Some(rule) => rule.multiplier.max(completion_fraction),
            None => completion_fraction,
        };
        let credit = credit.clamp(0.0, 1.0);

        let points_awarded = credit * section.points;
        let kind = if credit >= 0.999 {
            FindingKind::Pass
        } else if credit <= 0.001 {
            FindingKind::Missing
        } else {
            FindingKind::PartialCredit
        };

        let note = format!(
            "vars {}/{}, functions {}/{}, columns {}/{} -> {:.0}% credit",
            vars_found,
            section.required_variables.len(),
            fns_found,
            section.required_functions.len(),
            cols_found,
            section.required_columns.len(),
            credit * 100.0
        );

        (points_awarded, Finding { section_id: section.id.clone(), kind, points_awarded, max_points: section.points, note })
    }

    fn evaluate_reflection_section(
        &self,
        section: &RubricSection,
        submission: &ParsedSubmission,
    ) -> (f64, Finding) {
        let expected = section.expected_reflections.len().max(1);
        let mut present = 0;
        for id in &section.expected_reflections {
            if let Some(answer) = submission.reflection_answers.get(id) {
                if answer.split_whitespace().count() >= section.min_words {
                    present += 1;
                }
            }
        }

        let credit = if section.expected_reflections.is_empty() {
            1.0
        } else {
            present as f64 / expected as f64
        };
        let points_awarded = credit * section.points;
        let kind = if credit >= 0.999 {
            FindingKind::Pass
        } else if credit <= 0.001 {
            FindingKind::Missing
        } else {
            FindingKind::PartialCredit
        };

        let note = format!(
            "{}/{} reflection answers meet the {}-word minimum",
            present,
            section.expected_reflections.len(),
            section.min_words
        );

        (points_awarded, Finding { section_id: section.id.clone(), kind, points_awarded, max_points: section.points, note })
    }
}

impl Default for DeterministicValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn fraction(found: usize, total: usize) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(found as f64 / total as f64)
    }
}

fn weighted_mean(values: &[Option<f64>]) -> f64 {
    let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if present.is_empty() {
        1.0 // a section with no required artefacts at all is vacuously complete
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Condition;
    use std::collections::HashSet;

    fn section(id: &str, vars: &[&str]) -> RubricSection {
        RubricSection {
            id: id.to_string(),
            name: id.to_string(),
            weight_fraction: 1.0,
            required_variables: vars.iter().map(|s| s.to_string()).collect(),
            required_functions: HashSet::new(),
            required_columns: HashSet::new(),
            kind: SectionKind::Code,
            points: 10.0,
            min_words: 50,
            expected_reflections: vec![],
        }
    }

    #[test]
    fn full_completion_scores_100() {
        let rubric = Rubric {
            assignment_id: "hw1".to_string(),
            total_points: 10.0,
            sections: vec![section("a", &["x", "y"])],
            partial_credit_rules: vec![],
        };
        let submission = ParsedSubmission {
            required_variables_present: ["x".to_string(), "y".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let validator = DeterministicValidator::new();
        let result = validator.evaluate(&rubric, &submission);
        assert!((result.base_score - 100.0).abs() < 1e-9);
        assert_eq!(result.findings[0].kind, FindingKind::Pass);
    }

    #[test]
    fn partial_completion_applies_rule_multiplier() {
        let rubric = Rubric {
            assignment_id: "hw1".to_string(),
            total_points: 10.0,
            sections: vec![section("a", &["x", "y", "z", "w"])],
            partial_credit_rules: vec![crate::models::Rule {
                id: "r1".to_string(),
                section_id: "a".to_string(),
                condition: Condition::CompletionAtLeast(0.5),
                multiplier: 0.6,
                priority: 1,
                explanation: "half credit floor".to_string(),
            }],
        };
        let submission = ParsedSubmission {
            required_variables_present: ["x".to_string(), "y".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let validator = DeterministicValidator::new();
        let result = validator.evaluate(&rubric, &submission);
        // completion_fraction = 0.5, rule applies multiplier 0.6, credit = max(0.6, 0.5) = 0.6
        assert!((result.base_score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn determinism_identical_inputs_identical_output() {
        let rubric = Rubric {
            assignment_id: "hw1".to_string(),
            total_points: 10.0,
            sections: vec![section("a", &["x"])],
            partial_credit_rules: vec![],
        };
        let submission = ParsedSubmission::default();
        let validator = DeterministicValidator::new();
        let r1 = validator.evaluate(&rubric, &submission);
        let r2 = validator.evaluate(&rubric, &submission);
        assert_eq!(r1.base_score, r2.base_score);
        assert_eq!(r1.findings.len(), r2.findings.len());
    }
}
