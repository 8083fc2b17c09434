use std::time::Duration;

use serde::Deserialize;

/// Default judge submission endpoint.
pub const DEFAULT_JUDGE_URL: &str = "https://judge0-ce.p.rapidapi.com/submissions";

/// Application configuration, read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Interface both listeners bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket relay port
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// Room new connections are placed in
    #[serde(default = "default_room")]
    pub room: String,

    /// Judge API key; code execution is refused without it
    pub rapidapi_key: Option<String>,

    #[serde(default = "default_judge_url")]
    pub judge_url: String,

    #[serde(default = "default_judge_host")]
    pub judge_host: String,

    /// Upper bound on one execution request
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,

    /// Browser origin allowed by CORS
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Config {
    /// Load configuration from environment variables or an app.env file.
    pub fn load() -> Result<Self, ConfigError> {
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            dotenvy::dotenv().ok();
        }

        let config = envy::from_env::<Config>()?;
        log::info!("Configuration loaded");
        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ws_address(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_port: default_ws_port(),
            room: default_room(),
            rapidapi_key: None,
            judge_url: default_judge_url(),
            judge_host: default_judge_host(),
            exec_timeout_secs: default_exec_timeout_secs(),
            cors_origin: default_cors_origin(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable error: {0}")]
    Env(#[from] envy::Error),
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ws_port() -> u16 {
    8081
}

fn default_room() -> String {
    pairpad_collab::identity::DEFAULT_ROOM.to_string()
}

fn default_judge_url() -> String {
    DEFAULT_JUDGE_URL.to_string()
}

fn default_judge_host() -> String {
    "judge0-ce.p.rapidapi.com".to_string()
}

fn default_exec_timeout_secs() -> u64 {
    20
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}
