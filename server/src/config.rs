//! Server configuration persisted as `server.json`.

use log::{info, warn};
use protocol::{truncate_wire, STRING_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 25565;
pub const DEFAULT_MAX_USERS: usize = 15;
/// Ids 1..=126 are the only ones a client can be assigned.
pub const MAX_PLAYER_IDS: usize = 126;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub server_name: String,
    pub motd: String,
    pub public: bool,
    pub verify_login: bool,
    pub max_users: usize,
    /// Periodically broadcast the list of online players.
    pub announce_players: bool,
    pub announce_interval_secs: u64,
    pub heartbeat_url: String,
    pub heartbeat_interval_secs: u64,
    /// Usernames that receive the operator user type on join.
    pub operators: Vec<String>,
    pub read_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
    pub level: LevelConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub name: String,
    pub width: i16,
    pub height: i16,
    pub length: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub override_salt: bool,
    pub salt: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            server_name: "Minecraft Server".to_string(),
            motd: "Midnight brings upon the new day".to_string(),
            public: true,
            verify_login: true,
            max_users: DEFAULT_MAX_USERS,
            announce_players: true,
            announce_interval_secs: 300,
            heartbeat_url: "https://www.classicube.net/server/heartbeat/".to_string(),
            heartbeat_interval_secs: 60,
            operators: Vec::new(),
            read_timeout_secs: None,
            write_timeout_secs: None,
            level: LevelConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            width: 256,
            height: 256,
            length: 256,
        }
    }
}

impl ServerConfig {
    /// Loads the config at `path`. A missing file yields the defaults, which
    /// are then written to `path` so the operator has something to edit.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(
                "Could not find {}; writing default configuration",
                path.display()
            );
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut config: ServerConfig = serde_json::from_str(text)?;
        config.validate();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Replaces out-of-range values with usable ones, logging each fix.
    pub fn validate(&mut self) {
        if self.port == 0 {
            warn!("[config] Invalid 'port' [0]; setting to default [{}]", DEFAULT_PORT);
            self.port = DEFAULT_PORT;
        }

        if self.max_users == 0 {
            warn!(
                "[config] Invalid 'max_users' [0]; setting to default [{}]",
                DEFAULT_MAX_USERS
            );
            self.max_users = DEFAULT_MAX_USERS;
        } else if self.max_users > MAX_PLAYER_IDS {
            warn!(
                "[config] 'max_users' [{}] exceeds the id pool; clamping to {}",
                self.max_users, MAX_PLAYER_IDS
            );
            self.max_users = MAX_PLAYER_IDS;
        }

        if self.server_name.chars().count() > STRING_LENGTH {
            let truncated = truncate_wire(&self.server_name, STRING_LENGTH);
            warn!("[config] 'server_name' too long; truncating to [{}]", truncated);
            self.server_name = truncated;
        }

        if self.motd.chars().count() > STRING_LENGTH {
            let truncated = truncate_wire(&self.motd, STRING_LENGTH);
            warn!("[config] 'motd' too long; truncating to [{}]", truncated);
            self.motd = truncated;
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_secs.map(Duration::from_secs)
    }

    pub fn is_operator(&self, username: &str) -> bool {
        self.operators.iter().any(|op| op.eq_ignore_ascii_case(username))
    }
}
