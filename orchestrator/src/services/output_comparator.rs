//! C5 — OutputComparator: compares executed cell outputs against a
//! reference solution with typed tolerances (§4.5).

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{OutputCellComparison, ParsedSubmission};

const SIZE_GUARD_BYTES: usize = 200 * 1024;
const TIME_GUARD: Duration = Duration::from_secs(30);

static NUMERIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?").unwrap());

pub struct OutputComparator {
    pub match_threshold: f64,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub order_sensitive: bool,
}

impl Default for OutputComparator {
    fn default() -> Self {
        Self {
            match_threshold: 0.80,
            relative_tolerance: 0.05,
            absolute_tolerance: 1e-9,
            order_sensitive: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputCompareResult {
    /// `None` when the size/time guard tripped (§4.5); the pipeline
    /// proceeds without an output-derived adjustment in that case.
    pub match_rate: Option<f64>,
    pub comparisons: Vec<OutputCellComparison>,
}

impl OutputComparator {
    pub fn new(match_threshold: f64) -> Self {
        Self { match_threshold, ..Default::default() }
    }

    pub fn compare(
        &self,
        submission: &ParsedSubmission,
        solution_outputs: &[String],
    ) -> OutputCompareResult {
        let total_bytes: usize =
            submission.code_cells.iter().map(|c| c.source.len() + c.outputs.iter().map(|o| o.text.len()).sum::<usize>()).sum();
        if total_bytes > SIZE_GUARD_BYTES {
            return OutputCompareResult::default();
        }

        let start = Instant::now();
        let mut comparisons = Vec::new();

        for (cell_index, cell) in submission.code_cells.iter().enumerate() {
            if start.elapsed() > TIME_GUARD {
                return OutputCompareResult::default();
            }

            let student_output = cell.outputs.iter().map(|o| o.text.as_str()).collect::<Vec<_>>().join("\n");
            let solution_output = solution_outputs.get(cell_index).cloned().unwrap_or_default();
            let similarity = self.similarity(&student_output, &solution_output);
            let matched = similarity >= self.match_threshold;

            comparisons.push(OutputCellComparison {
                cell_index,
                student_output,
                solution_output,
                similarity,
                matched,
            });
        }

        let match_rate = if comparisons.is_empty() {
            None
        } else {
            let matched = comparisons.iter().filter(|c| c.matched).count();
            Some(matched as f64 / comparisons.len() as f64)
        };

        OutputCompareResult { match_rate, comparisons }
    }

    pub fn similarity(&self, student: &str, solution: &str) -> f64 {
        let student_norm = normalize(student);
        let solution_norm = normalize(solution);

        let numeric_agreement = self.numeric_agreement(&student_norm, &solution_norm);
        let text_similarity = self.text_similarity(&student_norm, &solution_norm);

        (0.5 * numeric_agreement + 0.5 * text_similarity).clamp(0.0, 1.0)
    }

    fn numeric_agreement(&self, a: &str, b: &str) -> f64 {
        let nums_a = extract_numbers(a);
        let nums_b = extract_numbers(b);

        if nums_a.is_empty() && nums_b.is_empty() {
            return 1.0;
        }
        if nums_a.len() != nums_b.len() {
            return 0.0;
        }

        let matched = nums_a
            .iter()
            .zip(nums_b.iter())
            .filter(|(x, y)| within_tolerance(**x, **y, self.relative_tolerance, self.absolute_tolerance))
            .count();
        matched as f64 / nums_a.len() as f64
    }

    fn text_similarity(&self, a: &str, b: &str) -> f64 {
        let lines_a = non_numeric_lines(a, self.order_sensitive);
        let lines_b = non_numeric_lines(b, self.order_sensitive);

        if lines_a.is_empty() && lines_b.is_empty() {
            return 1.0;
        }

        let lcs_len = lcs_length(&lines_a, &lines_b);
        let denom = lines_a.len().max(lines_b.len());
        if denom == 0 {
            1.0
        } else {
            lcs_len as f64 / denom as f64
        }
    }
}

fn normalize(s: &str) -> String {
    s.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_numbers(s: &str) -> Vec<f64> {
    NUMERIC_TOKEN.find_iter(s).filter_map(|m| m.as_str().parse::<f64>().ok()).collect()
}

fn within_tolerance(a: f64, b: f64, rel: f64, abs: f64) -> bool {
    let diff = (a - b).abs();
    diff <= abs || diff <= rel * a.abs().max(b.abs())
}

fn non_numeric_lines(s: &str, order_sensitive: bool) -> Vec<String> {
    let stripped: Vec<String> =
        s.lines().map(|line| NUMERIC_TOKEN.replace_all(line, "").trim().to_string()).filter(|l| !l.is_empty()).collect();
    if order_sensitive {
        stripped
    } else {
        let mut sorted = stripped;
        sorted.sort();
        sorted
    }
}

fn lcs_length(a: &[String], b: &[String]) -> usize {
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            dp[i][j] =
                if a[i - 1] == b[j - 1] { dp[i - 1][j - 1] + 1 } else { dp[i - 1][j].max(dp[i][j - 1]) };
        }
    }
    dp[a.len()][b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellOutput, CodeCell};

    #[test]
    fn identical_outputs_match() {
        let comparator = OutputComparator::default();
        let sim = comparator.similarity("total: 42", "total: 42");
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn within_relative_tolerance_still_matches() {
        let comparator = OutputComparator::default();
        let sim = comparator.similarity("mean: 100.0", "mean: 104.0");
        assert!(sim >= 0.80);
    }

    #[test]
    fn wildly_different_numbers_fail() {
        let comparator = OutputComparator::default();
        let sim = comparator.similarity("mean: 100.0", "mean: 9000.0");
        assert!(sim < 0.80);
    }

    #[test]
    fn match_rate_over_cells() {
        let comparator = OutputComparator::default();
        let submission = ParsedSubmission {
            code_cells: vec![
                CodeCell { source: String::new(), outputs: vec![CellOutput { text: "42".to_string() }] },
                CodeCell { source: String::new(), outputs: vec![CellOutput { text: "wrong".to_string() }] },
            ],
            ..Default::default()
        };
        let result = comparator.compare(&submission, &["42".to_string(), "right".to_string()]);
        assert_eq!(result.match_rate, Some(0.5));
    }

    #[test]
    fn size_guard_aborts_oversized_submission() {
        let comparator = OutputComparator::default();
        let huge_text = "x".repeat(300 * 1024);
        let submission = ParsedSubmission {
            code_cells: vec![CodeCell { source: huge_text, outputs: vec![] }],
            ..Default::default()
        };
        let result = comparator.compare(&submission, &[]);
        assert!(result.match_rate.is_none());
    }
}
