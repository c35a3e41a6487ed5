use serde::{Deserialize, Serialize};
use sse_session::SessionConfig;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            instance_id: default_instance_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Period of the `: heartbeat` comment frame
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Upper bound for the random gaps of the demo streams
    #[serde(default = "default_max_event_delay_ms")]
    pub max_event_delay_ms: u64,
    /// Gap of the fixed-pace demo streams
    #[serde(default = "default_fixed_delay_ms")]
    pub fixed_delay_ms: u64,
    /// Progress events per demo stream
    #[serde(default = "default_event_count")]
    pub event_count: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_event_delay_ms: default_max_event_delay_ms(),
            fixed_delay_ms: default_fixed_delay_ms(),
            event_count: default_event_count(),
        }
    }
}

impl StreamConfig {
    pub fn max_event_delay(&self) -> Duration {
        Duration::from_millis(self.max_event_delay_ms)
    }

    pub fn fixed_delay(&self) -> Duration {
        Duration::from_millis(self.fixed_delay_ms)
    }

    /// Session settings for an endpoint ending with `complete_message`
    pub fn session_config(&self, complete_message: &str) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            complete_message: complete_message.to_string(),
            ..SessionConfig::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token -> subject (usually an email)
    /// 为空时，受保护的流一律返回 401
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

fn default_port() -> u16 {
    8080
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

fn default_max_event_delay_ms() -> u64 {
    30_000
}

fn default_fixed_delay_ms() -> u64 {
    1_000
}

fn default_event_count() -> usize {
    5
}

/// Parse `token=subject,token2=subject2`
pub fn parse_tokens(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (token, subject) = pair.split_once('=')?;
            let (token, subject) = (token.trim(), subject.trim());
            if token.is_empty() || subject.is_empty() {
                return None;
            }
            Some((token.to_string(), subject.to_string()))
        })
        .collect()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        // 环境变量覆盖配置文件（优先级更高）
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }
        if let Ok(ms) = std::env::var("HEARTBEAT_INTERVAL_MS") {
            if let Ok(ms) = ms.parse() {
                config.stream.heartbeat_interval_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("MAX_EVENT_DELAY_MS") {
            if let Ok(ms) = ms.parse() {
                config.stream.max_event_delay_ms = ms;
            }
        }
        if let Ok(tokens) = std::env::var("AUTH_TOKENS") {
            config.auth.tokens.extend(parse_tokens(&tokens));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.stream.session_config("").validate()?;
        Ok(())
    }
}
