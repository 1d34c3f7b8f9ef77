//! Client configuration.
//!
//! Loaded via the `config` crate from an optional TOML file, overridden by
//! environment variables such as `PAIRCHAT__CONTACTS__REFRESH_INTERVAL_SECONDS`.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "PAIRCHAT";

/// Client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Contact directory settings.
    #[serde(default)]
    pub contacts: ContactsConfig,

    /// Identity settings.
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Contact directory settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContactsConfig {
    /// Seconds between full refreshes of the contact list.
    #[serde(default = "default_refresh_interval_seconds")]
    pub refresh_interval_seconds: u64,

    /// Whether to insert the placeholder contacts at sign-in.
    #[serde(default = "default_seed_sample_contacts")]
    pub seed_sample_contacts: bool,
}

/// Identity settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityConfig {
    /// Shortest password the in-memory identity service accepts.
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

fn default_refresh_interval_seconds() -> u64 {
    30
}

fn default_seed_sample_contacts() -> bool {
    true
}

fn default_min_password_length() -> usize {
    6
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval_seconds(),
            seed_sample_contacts: default_seed_sample_contacts(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            min_password_length: default_min_password_length(),
        }
    }
}

impl ContactsConfig {
    /// Refresh period of the contact feed. Never shorter than one second.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }
}

impl ClientConfig {
    /// Loads configuration from `path`, if given, and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::from_sources(path, environment())
    }

    fn from_sources(
        path: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(environment)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env() -> config::Environment {
        environment().source(Some(HashMap::new()))
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = ClientConfig::from_sources(None, no_env()).unwrap();

        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.contacts.refresh_interval(), Duration::from_secs(30));
        assert!(config.contacts.seed_sample_contacts);
        assert_eq!(config.identity.min_password_length, 6);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairchat.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[contacts]\nrefresh_interval_seconds = 5").unwrap();

        let config = ClientConfig::from_sources(Some(&path), no_env()).unwrap();

        assert_eq!(config.contacts.refresh_interval_seconds, 5);
        assert!(config.contacts.seed_sample_contacts);
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairchat.toml");
        std::fs::write(&path, "[contacts]\nseed_sample_contacts = true\n").unwrap();
        let vars = HashMap::from([
            (
                "PAIRCHAT__CONTACTS__SEED_SAMPLE_CONTACTS".to_string(),
                "false".to_string(),
            ),
            (
                "PAIRCHAT__IDENTITY__MIN_PASSWORD_LENGTH".to_string(),
                "10".to_string(),
            ),
        ]);

        let config =
            ClientConfig::from_sources(Some(&path), environment().source(Some(vars))).unwrap();

        assert!(!config.contacts.seed_sample_contacts);
        assert_eq!(config.identity.min_password_length, 10);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let contacts = ContactsConfig {
            refresh_interval_seconds: 0,
            seed_sample_contacts: false,
        };
        assert_eq!(contacts.refresh_interval(), Duration::from_secs(1));
    }
}
