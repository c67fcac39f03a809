//! Environment-variable configuration helpers shared by the binaries.

use std::str::FromStr;

/// Default Cloudflare REST API base.
pub const DEFAULT_QUEUE_API_URL: &str = "https://api.cloudflare.com/client/v4";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Typed reads over a variable lookup. Blank values count as unset.
pub struct Env<F: Fn(&str) -> Option<String>>(pub F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    pub fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    pub fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    /// Parse `name`, falling back to `default` when unset.
    pub fn parsed<T: FromStr>(
        &self,
        name: &'static str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name,
                expected,
                value,
            }),
        }
    }

    /// Like [`Env::parsed`] for a count of seconds that must be non-zero.
    pub fn positive_secs(&self, name: &'static str, default: u64) -> Result<u64, ConfigError> {
        const EXPECTED: &str = "a positive number of seconds";
        let secs = self.parsed(name, default, EXPECTED)?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                name,
                expected: EXPECTED,
                value: secs.to_string(),
            });
        }
        Ok(secs)
    }
}
