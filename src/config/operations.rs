//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{PushlockError, Result};
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(PushlockError::UserError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            PushlockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config from a YAML file if it exists, otherwise use defaults.
    ///
    /// A file that exists but fails to parse or validate is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml).map_err(|e| {
            PushlockError::UserError(format!("failed to parse config YAML: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            PushlockError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lock_ttl_secs`, `max_push_attempts` and `backoff_initial_ms` must be positive
    /// - `backoff_initial_ms` must not exceed `backoff_max_ms`
    /// - lock directories must be non-empty relative paths, and distinct
    /// - `remote`, `user_email` and `user_name` must be non-empty
    /// - `add_files` must be non-empty with no blank entries
    pub fn validate(&self) -> Result<()> {
        if self.lock_ttl_secs == 0 {
            return Err(invalid("lock_ttl_secs must be greater than 0"));
        }

        if self.max_push_attempts == 0 {
            return Err(invalid("max_push_attempts must be greater than 0"));
        }

        if self.backoff_initial_ms == 0 {
            return Err(invalid("backoff_initial_ms must be greater than 0"));
        }

        if self.backoff_initial_ms > self.backoff_max_ms {
            return Err(invalid(&format!(
                "backoff_initial_ms ({}) must not exceed backoff_max_ms ({})",
                self.backoff_initial_ms, self.backoff_max_ms
            )));
        }

        for (field, dir) in [
            ("git_locks_dir", &self.git_locks_dir),
            ("workflow_locks_dir", &self.workflow_locks_dir),
        ] {
            if dir.trim().is_empty() {
                return Err(invalid(&format!("{} must not be empty", field)));
            }
            if Path::new(dir).is_absolute() {
                return Err(invalid(&format!(
                    "{} must be relative to the repository root (found '{}')",
                    field, dir
                )));
            }
        }

        if self.git_locks_dir == self.workflow_locks_dir {
            return Err(invalid(
                "git_locks_dir and workflow_locks_dir must be different directories",
            ));
        }

        for (field, value) in [
            ("remote", &self.remote),
            ("user_email", &self.user_email),
            ("user_name", &self.user_name),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(&format!("{} must not be empty", field)));
            }
        }

        if self.add_files.is_empty() {
            return Err(invalid("add_files must list at least one path"));
        }
        if self.add_files.iter().any(|f| f.trim().is_empty()) {
            return Err(invalid("add_files entries must be non-empty"));
        }

        Ok(())
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn lock_max_wait(&self) -> Duration {
        Duration::from_secs(self.lock_max_wait_secs)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

fn invalid(reason: &str) -> PushlockError {
    PushlockError::UserError(format!("config validation failed: {}", reason))
}
