use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_websocket_bind")]
    pub websocket_bind: String,
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Time a new connection gets to send its request and complete the upgrade.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

fn default_websocket_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_websocket_port() -> u16 {
    8120
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_snapshot_interval_ms() -> u64 {
    5_000
}
fn default_heartbeat_interval_ms() -> u64 {
    10_000
}
fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}
fn default_max_connections() -> usize {
    256
}
fn default_handshake_timeout_ms() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            websocket_bind: default_websocket_bind(),
            websocket_port: default_websocket_port(),
            tick_interval_ms: default_tick_interval_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            max_connections: default_max_connections(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl ServerConfig {
    pub fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.tick_interval_ms == 0 {
            errors.push(format!(
                "server.tick_interval_ms must be > 0, got {}. Example: tick_interval_ms = 100",
                self.tick_interval_ms
            ));
        }

        if self.snapshot_interval_ms < self.tick_interval_ms {
            errors.push(format!(
                "server.snapshot_interval_ms must be >= tick_interval_ms, got {}. Example: snapshot_interval_ms = 5000",
                self.snapshot_interval_ms
            ));
        }

        if !(1024..=65535).contains(&self.websocket_port) {
            errors.push(format!(
                "server.websocket_port must be 1024-65535, got {}. Example: websocket_port = 8120",
                self.websocket_port
            ));
        }

        if self.heartbeat_interval_ms == 0 {
            errors.push(format!(
                "server.heartbeat_interval_ms must be > 0, got {}. Example: heartbeat_interval_ms = 10000",
                self.heartbeat_interval_ms
            ));
        }

        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            errors.push(format!(
                "server.heartbeat_timeout_ms must exceed heartbeat_interval_ms ({}), got {}. Example: heartbeat_timeout_ms = 30000",
                self.heartbeat_interval_ms, self.heartbeat_timeout_ms
            ));
        }

        if self.max_connections == 0 {
            errors.push(format!(
                "server.max_connections must be > 0, got {}. Example: max_connections = 256",
                self.max_connections
            ));
        }

        if self.handshake_timeout_ms == 0 {
            errors.push(format!(
                "server.handshake_timeout_ms must be > 0, got {}. Example: handshake_timeout_ms = 10000",
                self.handshake_timeout_ms
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "server.log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                valid_levels, self.log_level
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for(config: &ServerConfig) -> Vec<String> {
        let mut errors = Vec::new();
        config.collect_errors(&mut errors);
        errors
    }

    #[test]
    fn defaults_are_valid() {
        assert!(errors_for(&ServerConfig::default()).is_empty());
    }

    #[test]
    fn invalid_websocket_port_rejected() {
        let config = ServerConfig {
            websocket_port: 80,
            ..ServerConfig::default()
        };
        let errors = errors_for(&config);
        assert!(errors[0].contains("websocket_port"));
        assert!(errors[0].contains("1024-65535"));
    }

    #[test]
    fn heartbeat_timeout_must_exceed_interval() {
        let config = ServerConfig {
            heartbeat_interval_ms: 5_000,
            heartbeat_timeout_ms: 5_000,
            ..ServerConfig::default()
        };
        let errors = errors_for(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("heartbeat_timeout_ms"));
    }

    #[test]
    fn zero_handshake_timeout_rejected() {
        let config = ServerConfig {
            handshake_timeout_ms: 0,
            ..ServerConfig::default()
        };
        let errors = errors_for(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("handshake_timeout_ms"));
    }

    #[test]
    fn invalid_log_level_rejected() {
        let config = ServerConfig {
            log_level: "verbose".to_string(),
            ..ServerConfig::default()
        };
        assert!(errors_for(&config)[0].contains("log_level"));
    }
}
