// ⚙️ Configuration - environment variables with logged defaults

use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_PATH: &str = "roommates.db";
pub const DEFAULT_NEIGHBORHOODS_CSV: &str = "data/usneighborhoods.csv";
pub const DEFAULT_EMAIL_DOMAIN: &str = "caltech.edu";
pub const DEFAULT_STATIC_DIR: &str = "web";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub neighborhoods_csv: PathBuf,
    /// Optional city-centroid table. Without it the resolver only knows neighborhoods.
    pub cities_csv: Option<PathBuf>,
    pub email_domain: String,
    /// `None` puts the map surface in its degraded state
    pub map_token: Option<String>,
    pub static_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            neighborhoods_csv: PathBuf::from(DEFAULT_NEIGHBORHOODS_CSV),
            cities_csv: None,
            email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
            map_token: None,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `load` with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            port: try_load(var("ROOMMATE_PORT"), "ROOMMATE_PORT", DEFAULT_PORT),
            db_path: try_load(var("ROOMMATE_DB_PATH"), "ROOMMATE_DB_PATH", PathBuf::from(DEFAULT_DB_PATH)),
            neighborhoods_csv: try_load(
                var("ROOMMATE_NEIGHBORHOODS_CSV"),
                "ROOMMATE_NEIGHBORHOODS_CSV",
                PathBuf::from(DEFAULT_NEIGHBORHOODS_CSV),
            ),
            cities_csv: var("ROOMMATE_CITIES_CSV").map(PathBuf::from),
            email_domain: try_load(
                var("ROOMMATE_EMAIL_DOMAIN"),
                "ROOMMATE_EMAIL_DOMAIN",
                DEFAULT_EMAIL_DOMAIN.to_string(),
            ),
            map_token: var("MAPBOX_ACCESS_TOKEN").or_else(|| {
                warn!("MAPBOX_ACCESS_TOKEN not set, map surface will be unavailable");
                None
            }),
            static_dir: try_load(var("ROOMMATE_STATIC_DIR"), "ROOMMATE_STATIC_DIR", PathBuf::from(DEFAULT_STATIC_DIR)),
        }
    }
}

fn try_load<T>(value: Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    let Some(raw) = value else {
        info!("{key} not set, using default: {default:?}");
        return default;
    };

    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default:?}");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(config_from(&[]), Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("ROOMMATE_PORT", "8080"),
            ("ROOMMATE_CITIES_CSV", "data/uscities.csv"),
            ("ROOMMATE_EMAIL_DOMAIN", "mit.edu"),
            ("MAPBOX_ACCESS_TOKEN", "pk.test"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.cities_csv, Some(PathBuf::from("data/uscities.csv")));
        assert_eq!(config.email_domain, "mit.edu");
        assert_eq!(config.map_token.as_deref(), Some("pk.test"));
    }

    #[test]
    fn test_invalid_port_falls_back() {
        let config = config_from(&[("ROOMMATE_PORT", "not-a-port"), ("MAPBOX_ACCESS_TOKEN", "   ")]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.map_token.is_none());
    }
}
