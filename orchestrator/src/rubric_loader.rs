//! Thin external-collaborator stand-in (§6.4): reads a `Rubric` from a JSON
//! or TOML file and validates it before it becomes authoritative input to
//! the pipeline.

use std::path::Path;

use crate::models::Rubric;
use crate::utils::ApiError;

pub fn load_rubric(path: &Path) -> Result<Rubric, ApiError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ApiError::InvalidRubric(format!("cannot read {}: {}", path.display(), e)))?;

    let rubric: Rubric = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)
            .map_err(|e| ApiError::InvalidRubric(format!("invalid rubric TOML: {}", e)))?,
        _ => serde_json::from_str(&content)
            .map_err(|e| ApiError::InvalidRubric(format!("invalid rubric JSON: {}", e)))?,
    };

    rubric.validate().map_err(ApiError::InvalidRubric)?;
    Ok(rubric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_json() {
        let path = std::env::temp_dir().join(format!("rubric-loader-test-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let result = load_rubric(&path);
        let _ = std::fs::remove_file(&path);
        assert!(result.is_err());
    }
}
