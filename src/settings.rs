//! Process settings read from the environment (and `.env`, loaded by the binary).
//!
//! | Variable                | Meaning                                   | Default           |
//! |-------------------------|-------------------------------------------|-------------------|
//! | `BIBFIELDS_ENV`         | `development` or `production`             | `development`     |
//! | `BIBFIELDS_SCHEMA`      | schema rules YAML                         | bundled rules     |
//! | `BIBFIELDS_COLLECTIONS` | collections JSON for collection facets    | none              |
//! | `BIBFIELDS_LOG`         | tracing filter (falls back to `RUST_LOG`) | per profile       |
//! | `BIBFIELDS_THREADS`     | extraction worker threads                 | one per CPU       |

use std::path::PathBuf;

/// Deployment profile, selecting logging defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            other => Err(format!(
                "Invalid BIBFIELDS_ENV '{}' (expected development or production)",
                other
            )),
        }
    }

    /// Log filter used when none is configured.
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Profile::Development => "bibfields=debug,info",
            Profile::Production => "warn",
        }
    }
}

/// Resolved process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub profile: Profile,
    pub schema_path: Option<PathBuf>,
    pub collections_path: Option<PathBuf>,
    pub log_filter: String,
    pub threads: Option<usize>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let profile = match non_empty("BIBFIELDS_ENV") {
            Some(value) => Profile::parse(&value)?,
            None => Profile::Development,
        };

        let log_filter = non_empty("BIBFIELDS_LOG")
            .or_else(|| non_empty("RUST_LOG"))
            .unwrap_or_else(|| profile.default_log_filter().to_string());

        let threads = match non_empty("BIBFIELDS_THREADS") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => return Err(format!("Invalid BIBFIELDS_THREADS '{}' (expected a positive integer)", value)),
            },
            None => None,
        };

        Ok(Self {
            profile,
            schema_path: non_empty("BIBFIELDS_SCHEMA").map(PathBuf::from),
            collections_path: non_empty("BIBFIELDS_COLLECTIONS").map(PathBuf::from),
            log_filter,
            threads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.profile, Profile::Development);
        assert_eq!(s.log_filter, "bibfields=debug,info");
        assert_eq!(s.schema_path, None);
        assert_eq!(s.threads, None);
    }

    #[test]
    fn test_production_profile_quiets_logs() {
        let s = settings(&[("BIBFIELDS_ENV", "Production")]).unwrap();
        assert_eq!(s.profile, Profile::Production);
        assert_eq!(s.log_filter, "warn");

        let s = settings(&[("BIBFIELDS_ENV", "prod"), ("RUST_LOG", "info")]).unwrap();
        assert_eq!(s.log_filter, "info");

        let s = settings(&[("RUST_LOG", "info"), ("BIBFIELDS_LOG", "trace")]).unwrap();
        assert_eq!(s.log_filter, "trace");
    }

    #[test]
    fn test_paths_and_threads() {
        let s = settings(&[
            ("BIBFIELDS_SCHEMA", "config/schema.yaml"),
            ("BIBFIELDS_COLLECTIONS", ""),
            ("BIBFIELDS_THREADS", "4"),
        ])
        .unwrap();
        assert_eq!(s.schema_path, Some(PathBuf::from("config/schema.yaml")));
        assert_eq!(s.collections_path, None);
        assert_eq!(s.threads, Some(4));
    }

    #[test]
    fn test_invalid_values() {
        assert!(settings(&[("BIBFIELDS_ENV", "staging")]).unwrap_err().contains("BIBFIELDS_ENV"));
        assert!(settings(&[("BIBFIELDS_THREADS", "0")]).unwrap_err().contains("BIBFIELDS_THREADS"));
        assert!(settings(&[("BIBFIELDS_THREADS", "many")]).is_err());
    }
}
