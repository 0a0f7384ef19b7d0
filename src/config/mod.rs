pub mod generation;
pub mod rules;
pub mod server;

use serde::Deserialize;
use std::path::Path;

use generation::WorldParams;
use rules::GameRules;
use server::ServerConfig;

/// Complete process configuration: one TOML file with `[server]`, `[world]` and `[rules]` tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub world: WorldParams,
    #[serde(default)]
    pub rules: GameRules,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: Config =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section, reporting all problems at once.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();
        self.server.collect_errors(&mut errors);
        self.world.collect_errors(&mut errors);
        self.rules.collect_errors(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn test_path() -> PathBuf {
        PathBuf::from("test-config.toml")
    }

    #[test]
    fn valid_config_loads_all_sections() {
        let toml = r#"
            [server]
            websocket_port = 9090
            websocket_bind = "0.0.0.0"
            tick_interval_ms = 50
            log_level = "debug"
            log_format = "json"

            [world]
            frequency = 12
            seed = 99
            mesh = "hexasphere"

            [rules]
            starting_gold = 1000.0
            missile_radius = 3
            auto_expand = true
        "#;
        let config = Config::from_toml_str(toml, &test_path()).unwrap();
        assert_eq!(config.server.websocket_port, 9090);
        assert_eq!(config.server.websocket_bind, "0.0.0.0");
        assert_eq!(config.server.tick_interval_ms, 50);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.log_format, server::LogFormat::Json);
        assert_eq!(config.world.frequency, 12);
        assert_eq!(config.world.seed, 99);
        assert_eq!(config.rules.starting_gold, 1000.0);
        assert_eq!(config.rules.missile_radius, 3);
        assert!(config.rules.auto_expand);
    }

    #[test]
    fn defaults_applied_for_empty_config() {
        let config = Config::from_toml_str("", &test_path()).unwrap();
        assert_eq!(config.server.tick_interval_ms, 100);
        assert_eq!(config.server.websocket_port, 8120);
        assert_eq!(config.server.websocket_bind, "127.0.0.1");
        assert_eq!(config.world.frequency, 20);
        assert_eq!(config.rules.missile_radius, 2);
        assert_eq!(config.rules.inactivity_timeout_ms, 1_800_000);
    }

    #[test]
    fn multiple_errors_reported_together() {
        let toml = "[server]\ntick_interval_ms = 0\n[world]\nfrequency = 0\n[rules]\nport_cost = -1.0";
        let err = Config::from_toml_str(toml, &test_path()).unwrap_err();
        assert!(err.contains("tick_interval_ms"));
        assert!(err.contains("frequency"));
        assert!(err.contains("port_cost"));
    }

    #[test]
    fn malformed_toml_includes_source_path() {
        let err = Config::from_toml_str("[server\nport = [", &test_path()).unwrap_err();
        assert!(err.contains("test-config.toml"));
    }

    #[test]
    fn unknown_mesh_rejected() {
        let err = Config::from_toml_str("[world]\nmesh = \"cube\"", &test_path()).unwrap_err();
        assert!(err.contains("test-config.toml"));
    }

    #[test]
    fn from_file_loads_valid_config() {
        let mut tmp = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(tmp, "[server]\ntick_interval_ms = 250").unwrap();
        let config = Config::from_file(tmp.path()).unwrap();
        assert_eq!(config.server.tick_interval_ms, 250);
    }

    #[test]
    fn from_file_missing_file_error() {
        let err = Config::from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.contains("Cannot read"));
    }
}
