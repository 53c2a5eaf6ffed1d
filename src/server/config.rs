use std::path::PathBuf;

use crate::models::DEFAULT_FREE_MAX_PROJECTS;

/// Server configuration, read from the environment:
///
/// - `BACKFORGE_PORT`: port to listen on (default: 8080)
/// - `BACKFORGE_DATABASE_PATH`: SQLite file (default: data dir + `backforge-server/backforge.db`)
/// - `BACKFORGE_KEYS`: API key file (default: config dir + `backforge-server/keys.yaml`)
/// - `BACKFORGE_FREE_MAX_PROJECTS`: project quota of the free plan
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub keys_path: PathBuf,
    pub free_max_projects: i64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("BACKFORGE_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let database_path = lookup("BACKFORGE_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("backforge-server")
                    .join("backforge.db")
            });

        let keys_path = lookup("BACKFORGE_KEYS")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("backforge-server")
                    .join("keys.yaml")
            });

        let free_max_projects = lookup("BACKFORGE_FREE_MAX_PROJECTS")
            .and_then(|n| n.parse().ok())
            .filter(|n: &i64| *n > 0)
            .unwrap_or(DEFAULT_FREE_MAX_PROJECTS);

        Self {
            port,
            database_path,
            keys_path,
            free_max_projects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.free_max_projects, DEFAULT_FREE_MAX_PROJECTS);
        assert!(config.database_path.ends_with("backforge-server/backforge.db"));
        assert!(config.keys_path.ends_with("backforge-server/keys.yaml"));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = config_from(&[
            ("BACKFORGE_PORT", "9000"),
            ("BACKFORGE_DATABASE_PATH", "/tmp/forge.db"),
            ("BACKFORGE_FREE_MAX_PROJECTS", "0"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_path, PathBuf::from("/tmp/forge.db"));
        assert_eq!(config.free_max_projects, DEFAULT_FREE_MAX_PROJECTS);

        assert_eq!(config_from(&[("BACKFORGE_PORT", "http")]).port, 8080);
    }
}
