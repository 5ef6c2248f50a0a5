//! Layered lookup for deployment settings.
//!
//! A setting is resolved from, in order:
//!
//! 1. the environment variable (e.g. `KEYSTORE_PATH`), if set and non-empty
//! 2. a process override keyed by the same name (CLI `--set KEYSTORE_PATH=...`)
//! 3. the config file entry (e.g. `keystore.path` in TOML), after
//!    `${VAR}` / `${VAR:default}` substitution against the environment

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Name of one setting in each of its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingKey {
    /// Environment variable, also the override key
    pub env: &'static str,
    /// Dotted path into the config file
    pub file: &'static str,
}

pub const KEYSTORE_PATH: SettingKey = SettingKey {
    env: "KEYSTORE_PATH",
    file: "keystore.path",
};

pub const KEYSTORE_PASSWORD: SettingKey = SettingKey {
    env: "KEYSTORE_PASSWORD",
    file: "keystore.password",
};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{} is not set (env {} or config {})", .0.file, .0.env, .0.file)]
    Missing(SettingKey),
    #[error("{key} references unset variable ${{{var}}} with no default")]
    Unresolved { key: &'static str, var: String },
    #[error("{key} has an unterminated ${{...}} reference")]
    Unterminated { key: &'static str },
    #[error("{key} must be a string, number or boolean")]
    Unsupported { key: &'static str },
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolved view over environment, process overrides and config file.
#[derive(Clone)]
pub struct Settings {
    env: EnvLookup,
    overrides: HashMap<String, String>,
    file: toml::Table,
}

impl fmt::Debug for Settings {
    // values may be secrets
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .field("file", &self.file.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Settings backed by the process environment only.
    pub fn new() -> Self {
        Self {
            env: Arc::new(|name| std::env::var(name).ok()),
            overrides: HashMap::new(),
            file: toml::Table::new(),
        }
    }

    /// Replace the environment lookup.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    /// Layer a TOML config file. A missing file is not an error.
    pub fn with_file(self, path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => self.with_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    pub fn with_toml(mut self, contents: &str) -> Result<Self, SettingsError> {
        self.file = contents.parse::<toml::Table>()?;
        Ok(self)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.is_empty())
    }

    /// Resolve a setting, `None` if no source provides it.
    pub fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        if let Some(value) = self.env_var(key.env) {
            return Ok(Some(value));
        }
        if let Some(value) = self.overrides.get(key.env).filter(|v| !v.is_empty()) {
            return Ok(Some(value.clone()));
        }

        let Some(raw) = self.file_value(key)? else {
            return Ok(None);
        };
        self.substitute(key.file, &raw).map(Some)
    }

    /// Resolve a setting that must be present.
    pub fn require(&self, key: SettingKey) -> Result<String, SettingsError> {
        self.get(key)?.ok_or(SettingsError::Missing(key))
    }

    fn file_value(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        let mut parts = key.file.split('.');
        let Some(first) = parts.next() else {
            return Ok(None);
        };
        let mut value = match self.file.get(first) {
            Some(v) => v,
            None => return Ok(None),
        };
        for part in parts {
            value = match value.get(part) {
                Some(v) => v,
                None => return Ok(None),
            };
        }

        match value {
            toml::Value::String(s) => Ok(Some(s.clone())),
            toml::Value::Integer(i) => Ok(Some(i.to_string())),
            toml::Value::Float(f) => Ok(Some(f.to_string())),
            toml::Value::Boolean(b) => Ok(Some(b.to_string())),
            _ => Err(SettingsError::Unsupported { key: key.file }),
        }
    }

    /// Expand every `${VAR}` and `${VAR:default}` in `raw`.
    fn substitute(&self, key: &'static str, raw: &str) -> Result<String, SettingsError> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or(SettingsError::Unterminated { key })?;
            let reference = &after[..end];

            let (var, default) = match reference.split_once(':') {
                Some((var, default)) => (var, Some(default)),
                None => (reference, None),
            };
            match (self.env_var(var), default) {
                (Some(value), _) => out.push_str(&value),
                (None, Some(default)) => out.push_str(default),
                (None, None) => {
                    return Err(SettingsError::Unresolved {
                        key,
                        var: var.to_string(),
                    })
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const FILE: &str = r#"
        [keystore]
        path = "/etc/strongbox/key.pem"
        password = "${STRONGBOX_PW:changeme}"
    "#;

    #[test]
    fn test_env_beats_override_beats_file() {
        let settings = Settings::new()
            .with_env(env(&[("KEYSTORE_PATH", "/from/env")]))
            .with_override("KEYSTORE_PATH", "/from/override")
            .with_toml(FILE)
            .unwrap();
        assert_eq!(settings.require(KEYSTORE_PATH).unwrap(), "/from/env");

        let settings = settings.with_env(env(&[]));
        assert_eq!(settings.require(KEYSTORE_PATH).unwrap(), "/from/override");

        let settings = Settings::new().with_env(env(&[])).with_toml(FILE).unwrap();
        assert_eq!(
            settings.require(KEYSTORE_PATH).unwrap(),
            "/etc/strongbox/key.pem"
        );
    }

    #[test]
    fn test_empty_env_is_ignored() {
        let settings = Settings::new()
            .with_env(env(&[("KEYSTORE_PATH", "")]))
            .with_toml(FILE)
            .unwrap();
        assert_eq!(
            settings.require(KEYSTORE_PATH).unwrap(),
            "/etc/strongbox/key.pem"
        );
    }

    #[test]
    fn test_substitution_default_and_env() {
        let settings = Settings::new().with_env(env(&[])).with_toml(FILE).unwrap();
        assert_eq!(settings.require(KEYSTORE_PASSWORD).unwrap(), "changeme");

        let settings = settings.with_env(env(&[("STRONGBOX_PW", "s3cret")]));
        assert_eq!(settings.require(KEYSTORE_PASSWORD).unwrap(), "s3cret");
    }

    #[test]
    fn test_substitution_inside_text() {
        let settings = Settings::new()
            .with_env(env(&[("HOME", "/home/ada")]))
            .with_toml(
                r#"
                [keystore]
                path = "${HOME}/.strongbox/${NAME:key}.pem"
                "#,
            )
            .unwrap();
        assert_eq!(
            settings.require(KEYSTORE_PATH).unwrap(),
            "/home/ada/.strongbox/key.pem"
        );
    }

    #[test]
    fn test_unresolved_variable_is_an_error() {
        let settings = Settings::new()
            .with_env(env(&[]))
            .with_toml("[keystore]\npassword = \"${NOPE}\"")
            .unwrap();
        assert!(matches!(
            settings.get(KEYSTORE_PASSWORD),
            Err(SettingsError::Unresolved { var, .. }) if var == "NOPE"
        ));

        let settings = settings
            .with_toml("[keystore]\npassword = \"${NOPE\"")
            .unwrap();
        assert!(matches!(
            settings.get(KEYSTORE_PASSWORD),
            Err(SettingsError::Unterminated { .. })
        ));
    }

    #[test]
    fn test_missing_setting() {
        let settings = Settings::new().with_env(env(&[]));
        assert!(settings.get(KEYSTORE_PATH).unwrap().is_none());
        assert!(matches!(
            settings.require(KEYSTORE_PATH),
            Err(SettingsError::Missing(k)) if k == KEYSTORE_PATH
        ));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new()
            .with_env(env(&[]))
            .with_file(&dir.path().join("absent.toml"))
            .unwrap();
        assert!(settings.get(KEYSTORE_PATH).unwrap().is_none());
    }

    #[test]
    fn test_debug_hides_values() {
        let settings = Settings::new()
            .with_env(env(&[]))
            .with_override("KEYSTORE_PASSWORD", "hunter2")
            .with_toml(FILE)
            .unwrap();
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("changeme"));
    }
}
