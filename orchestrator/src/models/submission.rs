use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One rendered output attached to an executed notebook cell.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CellOutput {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CodeCell {
    pub source: String,
    pub outputs: Vec<CellOutput>,
}

/// Supplied by the external notebook-parsing collaborator (§6.4); treated as
/// a black box input here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct ParsedSubmission {
    pub code_cells: Vec<CodeCell>,
    pub markdown_cells: Vec<String>,
    pub required_variables_present: HashSet<String>,
    pub errors_present: Vec<String>,
    /// Reflection answers keyed by the rubric's reflection-prompt id.
    #[serde(default)]
    pub reflection_answers: std::collections::HashMap<String, String>,
}

impl ParsedSubmission {
    /// Identifiers referenced as function calls anywhere in the submission's
    /// code cells — a coarse heuristic (`name(` token scan), sufficient for
    /// matching rubric-declared required functions without a full parser.
    pub fn functions_referenced(&self) -> HashSet<String> {
        let mut found = HashSet::new();
        for cell in &self.code_cells {
            for token in tokenize_calls(&cell.source) {
                found.insert(token);
            }
        }
        found
    }

    /// Column-like string literals referenced in code cells, e.g.
    /// `df["col"]` or `df['col']`.
    pub fn columns_referenced(&self) -> HashSet<String> {
        let mut found = HashSet::new();
        for cell in &self.code_cells {
            for token in tokenize_string_literals(&cell.source) {
                found.insert(token);
            }
        }
        found
    }

    pub fn has_errors(&self) -> bool {
        !self.errors_present.is_empty()
    }
}

fn tokenize_calls(source: &str) -> Vec<String> {
    let mut out = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'(' {
            let mut j = i;
            while j > 0
                && (bytes[j - 1].is_ascii_alphanumeric() || bytes[j - 1] == b'_' || bytes[j - 1] == b'.')
            {
                j -= 1;
            }
            if j < i {
                let name = &source[j..i];
                let name = name.rsplit('.').next().unwrap_or(name);
                if !name.is_empty()
                    && name.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
                {
                    out.push(name.to_string());
                }
            }
        }
        i += 1;
    }
    out
}

fn tokenize_string_literals(source: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' || c == '\'' {
            let quote = c;
            let mut literal = String::new();
            for c2 in chars.by_ref() {
                if c2 == quote {
                    break;
                }
                literal.push(c2);
            }
            if !literal.is_empty() && literal.chars().all(|c| c.is_alphanumeric() || c == '_') {
                out.push(literal);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_function_calls() {
        let cell = CodeCell { source: "df.groupby('x').mean()".to_string(), outputs: vec![] };
        let submission = ParsedSubmission { code_cells: vec![cell], ..Default::default() };
        let found = submission.functions_referenced();
        assert!(found.contains("groupby"));
        assert!(found.contains("mean"));
    }

    #[test]
    fn finds_column_literals() {
        let cell = CodeCell { source: "df['revenue'].sum()".to_string(), outputs: vec![] };
        let submission = ParsedSubmission { code_cells: vec![cell], ..Default::default() };
        let found = submission.columns_referenced();
        assert!(found.contains("revenue"));
    }
}
