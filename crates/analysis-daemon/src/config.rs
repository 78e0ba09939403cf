use analysis_orchestrator::ServiceConfig;
use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use llm_client::LlmConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use task_scheduler::{AnalysisDefaults, NewsDefaults, SchedulerConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Storage
    pub database_url: String,
    pub history_backfill_days: i64,

    // Exchange
    pub bybit_base_url: String,
    pub bybit_rate_limit: usize, // requests per minute

    // News
    pub news_api_url: String,
    pub news_api_key: Option<String>,

    // LLM
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout_seconds: u64,

    // Scheduler
    pub scheduler_enabled: bool,
    pub schedule_time_utc: NaiveTime,
    pub scheduler_poll_seconds: u64,
    pub scheduler_max_wait_seconds: u64,
    pub run_on_start: bool,
    pub heartbeat_seconds: u64,

    // Scheduled task parameters
    pub analysis_top_n: usize,
    pub news_top_n: usize,
    pub news_per_symbol: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup; missing keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let schedule_time = var("SCHEDULE_TIME_UTC", "00:00");

        let config = Self {
            database_url: var("DATABASE_URL", "sqlite:crypto_factors.db"),
            history_backfill_days: parse(&lookup, "HISTORY_BACKFILL_DAYS", "180")?,

            bybit_base_url: var("BYBIT_BASE_URL", bybit_client::DEFAULT_BASE_URL),
            bybit_rate_limit: parse(&lookup, "BYBIT_RATE_LIMIT", "600")?,

            news_api_url: var("NEWS_API_URL", news_feed::DEFAULT_NEWS_URL),
            news_api_key: optional("NEWS_API_KEY"),

            llm_base_url: var("LLM_BASE_URL", "https://api.openai.com/v1"),
            llm_api_key: optional("LLM_API_KEY"),
            llm_model: var("LLM_MODEL", "gpt-oss-120b"),
            llm_timeout_seconds: parse(&lookup, "LLM_TIMEOUT_SECONDS", "120")?,

            scheduler_enabled: parse(&lookup, "SCHEDULER_ENABLED", "true")?,
            schedule_time_utc: NaiveTime::parse_from_str(schedule_time.trim(), "%H:%M")
                .with_context(|| format!("SCHEDULE_TIME_UTC must be HH:MM, got '{}'", schedule_time))?,
            scheduler_poll_seconds: parse(&lookup, "SCHEDULER_POLL_SECONDS", "10")?,
            scheduler_max_wait_seconds: parse(&lookup, "SCHEDULER_MAX_WAIT_SECONDS", "3600")?,
            run_on_start: parse(&lookup, "RUN_ON_START", "false")?,
            heartbeat_seconds: parse(&lookup, "HEARTBEAT_SECONDS", "300")?,

            analysis_top_n: parse(&lookup, "ANALYSIS_TOP_N", "20")?,
            news_top_n: parse(&lookup, "NEWS_TOP_N", "10")?,
            news_per_symbol: parse(&lookup, "NEWS_PER_SYMBOL", "3")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            bail!("DATABASE_URL must not be empty");
        }
        if self.history_backfill_days <= 0 {
            bail!("HISTORY_BACKFILL_DAYS must be positive, got {}", self.history_backfill_days);
        }
        if self.bybit_rate_limit == 0 {
            bail!("BYBIT_RATE_LIMIT must be at least 1 request per minute");
        }
        if self.llm_model.trim().is_empty() {
            bail!("LLM_MODEL must not be empty");
        }
        if self.llm_timeout_seconds == 0 {
            bail!("LLM_TIMEOUT_SECONDS must be positive");
        }
        if self.scheduler_poll_seconds == 0 {
            bail!("SCHEDULER_POLL_SECONDS must be positive");
        }
        if self.scheduler_max_wait_seconds < self.scheduler_poll_seconds {
            bail!(
                "SCHEDULER_MAX_WAIT_SECONDS ({}) must be at least SCHEDULER_POLL_SECONDS ({})",
                self.scheduler_max_wait_seconds,
                self.scheduler_poll_seconds
            );
        }
        if self.analysis_top_n == 0 || self.news_top_n == 0 || self.news_per_symbol == 0 {
            bail!("ANALYSIS_TOP_N, NEWS_TOP_N and NEWS_PER_SYMBOL must be positive");
        }
        Ok(())
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            default_model: self.llm_model.clone(),
            ..ServiceConfig::default()
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            base_url: self.llm_base_url.clone(),
            api_key: self.llm_api_key.clone(),
            timeout: Duration::from_secs(self.llm_timeout_seconds),
            ..LlmConfig::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            run_at: self.schedule_time_utc,
            poll_interval: Duration::from_secs(self.scheduler_poll_seconds),
            max_wait: Duration::from_secs(self.scheduler_max_wait_seconds),
            enabled: self.scheduler_enabled,
            analysis: AnalysisDefaults {
                top_n: self.analysis_top_n,
                ..AnalysisDefaults::default()
            },
            news: NewsDefaults {
                top_n: self.news_top_n,
                news_per_symbol: self.news_per_symbol,
                model: self.llm_model.clone(),
            },
        }
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: '{}'", key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite:crypto_factors.db");
        assert_eq!(config.bybit_rate_limit, 600);
        assert_eq!(config.llm_model, "gpt-oss-120b");
        assert_eq!(config.schedule_time_utc, NaiveTime::MIN);
        assert_eq!(config.history_backfill_days, 180);
        assert!(config.scheduler_enabled);
        assert!(!config.run_on_start);
        assert_eq!(config.news_api_key, None);

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.analysis.top_n, 20);
        assert_eq!(scheduler.news.top_n, 10);
        assert_eq!(scheduler.news.news_per_symbol, 3);
        assert_eq!(scheduler.max_wait, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SCHEDULE_TIME_UTC", "06:30"),
            ("LLM_MODEL", "qwen-72b"),
            ("SCHEDULER_ENABLED", "false"),
            ("NEWS_API_KEY", "  "),
            ("LLM_API_KEY", "sk-test"),
            ("ANALYSIS_TOP_N", "35"),
        ])
        .unwrap();

        assert_eq!(config.schedule_time_utc, NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert!(!config.scheduler_enabled);
        assert_eq!(config.news_api_key, None);
        assert_eq!(config.llm_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.service_config().default_model, "qwen-72b");
        assert_eq!(config.scheduler_config().news.model, "qwen-72b");
        assert_eq!(config.scheduler_config().analysis.top_n, 35);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config_from(&[("SCHEDULE_TIME_UTC", "25:00")]).is_err());
        assert!(config_from(&[("ANALYSIS_TOP_N", "many")]).is_err());
        assert!(config_from(&[("BYBIT_RATE_LIMIT", "0")]).is_err());
        assert!(config_from(&[("SCHEDULER_POLL_SECONDS", "60"), ("SCHEDULER_MAX_WAIT_SECONDS", "30")]).is_err());
        assert!(config_from(&[("HISTORY_BACKFILL_DAYS", "-1")]).is_err());
    }
}
