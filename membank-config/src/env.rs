// Environment variable loading

use crate::Result;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Separator between nested sections in a variable name.
pub const SECTION_SEPARATOR: &str = "__";

/// Environment variable loader.
///
/// `MEMBANK_QUEUE__MAX_RETRIES=5` becomes `{"queue": {"max_retries": "5"}}`.
/// Values stay strings; the settings types accept numeric text.
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a loader for variables starting with `prefix` and `_`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Collect variables from the process environment.
    pub fn process_vars() -> HashMap<String, String> {
        env::vars().collect()
    }

    /// Read a `.env` file without touching the process environment.
    pub fn dotenv_vars(path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Ok(vars)
    }

    /// Build a nested document from the variables carrying this prefix.
    pub fn overlay<I>(&self, vars: I) -> Value
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}_", self.prefix);
        let mut root = Map::new();

        for (key, value) in vars {
            let Some(path) = key.strip_prefix(&prefix) else {
                continue;
            };
            let segments: Vec<String> = path
                .split(SECTION_SEPARATOR)
                .map(|s| s.to_lowercase())
                .collect();
            if segments.iter().any(|s| s.is_empty()) {
                continue;
            }
            insert(&mut root, &segments, value);
        }

        Value::Object(root)
    }
}

fn insert(map: &mut Map<String, Value>, segments: &[String], value: String) {
    match segments {
        [] => {}
        [last] => {
            map.insert(last.clone(), Value::String(value));
        }
        [first, rest @ ..] => {
            let entry = map
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_overlay_nests_sections() {
        let loader = EnvLoader::new("MEMBANK");
        let overlay = loader.overlay(vars(&[
            ("MEMBANK_QUEUE__MAX_RETRIES", "5"),
            ("MEMBANK_REDIS__URL", "redis://cache:6379"),
            ("OTHER_QUEUE__MAX_RETRIES", "9"),
        ]));

        assert_eq!(overlay["queue"]["max_retries"], "5");
        assert_eq!(overlay["redis"]["url"], "redis://cache:6379");
        assert!(overlay.get("other_queue").is_none());
    }

    #[test]
    fn test_overlay_skips_malformed_names() {
        let loader = EnvLoader::new("MEMBANK");
        let overlay = loader.overlay(vars(&[("MEMBANK_QUEUE__", "x"), ("MEMBANK___A", "y")]));
        assert_eq!(overlay, Value::Object(Map::new()));
    }

    #[test]
    fn test_dotenv_file_is_read_without_mutating_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "MEMBANK_TEST_DOTENV_ONLY__KEY=\"quoted value\"").unwrap();

        let vars = EnvLoader::dotenv_vars(file.path()).unwrap();
        assert_eq!(vars["MEMBANK_TEST_DOTENV_ONLY__KEY"], "quoted value");
        assert!(env::var("MEMBANK_TEST_DOTENV_ONLY__KEY").is_err());
    }

    #[test]
    fn test_missing_dotenv_is_io_error() {
        let err = EnvLoader::dotenv_vars("/nonexistent/.env").unwrap_err();
        assert!(matches!(err, crate::ConfigError::Io(_)));
    }
}
