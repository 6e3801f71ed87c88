//! Thin external-collaborator stand-in (§6.4): reads a `ParsedSubmission`
//! from a JSON file shaped like the black-box notebook parser's output.

use std::path::Path;

use crate::models::ParsedSubmission;
use crate::utils::ApiError;

pub fn load_submission(path: &Path) -> Result<ParsedSubmission, ApiError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ApiError::internal(format!("cannot read {}: {}", path.display(), e)))?;
    let submission: ParsedSubmission = serde_json::from_str(&content)?;
    Ok(submission)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_submission() {
        let path = std::env::temp_dir().join(format!("submission-loader-test-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"code_cells":[],"markdown_cells":[],"required_variables_present":[],"errors_present":[]}"#).unwrap();
        let submission = load_submission(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(submission.code_cells.is_empty());
    }
}
