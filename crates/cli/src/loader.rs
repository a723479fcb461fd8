//! Template loading from the filesystem.

use std::path::{Path, PathBuf};

use qti_core::{Rule, RuleFamily};
use qti_eval::{StaticTemplateLoader, TemplateLoader};
use tracing::debug;

/// Serves `builtin:` locations from memory and everything else from JSON
/// template files (`{ "rules": [...] }`) relative to `base`.
pub(crate) struct FileTemplateLoader {
    base: PathBuf,
    builtin: StaticTemplateLoader,
}

impl FileTemplateLoader {
    pub(crate) fn new(base: impl Into<PathBuf>) -> Self {
        FileTemplateLoader {
            base: base.into(),
            builtin: StaticTemplateLoader::standard(),
        }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

impl TemplateLoader for FileTemplateLoader {
    fn load(&self, location: &str) -> Result<Option<Vec<Rule>>, String> {
        if location.starts_with("builtin:") {
            return self.builtin.load(location);
        }
        let path = self.resolve(location);
        if !path.is_file() {
            debug!(location, path = %path.display(), "no template file");
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| format!("invalid JSON in {}: {}", path.display(), e))?;
        qti_interchange::parse_template(&json, RuleFamily::Response)
            .map(Some)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_locations_served_from_memory() {
        let loader = FileTemplateLoader::new("/nonexistent");
        let rules = loader.load("builtin:match_correct").unwrap();
        assert_eq!(rules.map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_relative_file_is_read_from_base() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("exit.json"),
            r#"{ "rules": [{ "kind": "exitResponse" }] }"#,
        )
        .unwrap();
        let loader = FileTemplateLoader::new(dir.path());
        assert_eq!(loader.load("exit.json").unwrap().map(|r| r.len()), Some(1));
        assert_eq!(loader.load("absent.json").unwrap(), None);
    }

    #[test]
    fn test_malformed_template_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.json"), r#"{ "rules": [{ "kind": "median" }] }"#).unwrap();
        let loader = FileTemplateLoader::new(dir.path());
        let err = loader.load("bad.json").unwrap_err();
        assert!(err.contains("unknown response rule kind 'median'"), "{}", err);
    }
}
