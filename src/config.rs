use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bridge_url: String,
    pub bridge_api_token: Option<String>,
    pub individual_chat_suffix: String,
    pub group_chat_suffix: String,
    pub send_timeout: Duration,
    // Query limits
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub max_context_window: usize,
    pub read_retry_attempts: usize,
    // Ingestion
    pub event_channel_capacity: usize,
    pub log_level: String,
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let send_timeout = match env::var("SEND_TIMEOUT") {
            Ok(raw) => humantime::parse_duration(raw.trim())
                .map_err(|e| anyhow::anyhow!("SEND_TIMEOUT must be a duration like '30s': {}", e))?,
            Err(_) => Duration::from_secs(30),
        };

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/messages.db".to_string()),
            bridge_url: env::var("BRIDGE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            bridge_api_token: env::var("BRIDGE_API_TOKEN").ok().filter(|t| !t.is_empty()),
            individual_chat_suffix: env::var("INDIVIDUAL_CHAT_SUFFIX")
                .unwrap_or_else(|_| "s.whatsapp.net".to_string()),
            group_chat_suffix: env::var("GROUP_CHAT_SUFFIX").unwrap_or_else(|_| "g.us".to_string()),
            send_timeout,
            default_page_size: parsed_or("DEFAULT_PAGE_SIZE", 20),
            max_page_size: parsed_or("MAX_PAGE_SIZE", 200),
            max_context_window: parsed_or("MAX_CONTEXT_WINDOW", 50),
            read_retry_attempts: parsed_or("READ_RETRY_ATTEMPTS", 3),
            event_channel_capacity: parsed_or("EVENT_CHANNEL_CAPACITY", 1024),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.send_timeout.is_zero() {
            anyhow::bail!("SEND_TIMEOUT must be greater than zero");
        }
        if self.max_page_size == 0 {
            anyhow::bail!("MAX_PAGE_SIZE must be at least 1");
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            anyhow::bail!(
                "DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE ({})",
                self.max_page_size
            );
        }
        if self.event_channel_capacity == 0 {
            anyhow::bail!("EVENT_CHANNEL_CAPACITY must be at least 1");
        }
        for (key, suffix) in [
            ("INDIVIDUAL_CHAT_SUFFIX", &self.individual_chat_suffix),
            ("GROUP_CHAT_SUFFIX", &self.group_chat_suffix),
        ] {
            if suffix.is_empty() || suffix.contains('@') {
                anyhow::bail!("{} must be a bare domain without '@'", key);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("bridge_url", &self.bridge_url)
            .field(
                "bridge_api_token",
                &self.bridge_api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("individual_chat_suffix", &self.individual_chat_suffix)
            .field("group_chat_suffix", &self.group_chat_suffix)
            .field("send_timeout", &humantime::format_duration(self.send_timeout).to_string())
            .field("default_page_size", &self.default_page_size)
            .field("max_page_size", &self.max_page_size)
            .field("max_context_window", &self.max_context_window)
            .field("read_retry_attempts", &self.read_retry_attempts)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .field("log_level", &self.log_level)
            .finish()
    }
}
