use std::time::Duration;

use anyhow::{Context, Result};

use crate::{llm::CallOptions, normalize::Repair, prompt::SYSTEM_PROMPT};

pub const MAX_SESSION_TTL_DAYS: i64 = 3650;
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-4-Maverick-17B-128E-Instruct-FP8";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub llm_api_key: String,
    pub llm_api_base: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout: Duration,
    pub weather_api_key: Option<String>,
    pub weather_api_base: String,
    pub repair: Repair,
    pub session_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`; unset or blank values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_api_key = var("LLM_API_KEY").context("LLM_API_KEY is not configured")?;
        let strip = parse_or(var("STRIP_BACKSLASHES"), true).context("STRIP_BACKSLASHES must be true or false")?;

        Ok(Self {
            port: parse_or(var("PORT"), 8000).context("PORT must be a number")?,
            llm_api_key,
            llm_api_base: var("LLM_API_BASE").unwrap_or_else(|| "https://api.together.xyz/v1".into()),
            llm_model: var("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            llm_temperature: parse_or(var("LLM_TEMPERATURE"), 0.7).context("LLM_TEMPERATURE must be a number")?,
            llm_max_tokens: parse_or(var("LLM_MAX_TOKENS"), 1000).context("LLM_MAX_TOKENS must be a number")?,
            llm_timeout: Duration::from_secs(
                parse_or(var("LLM_TIMEOUT_SECS"), 10).context("LLM_TIMEOUT_SECS must be a number")?,
            ),
            weather_api_key: var("WEATHER_API_KEY"),
            weather_api_base: var("WEATHER_API_BASE")
                .unwrap_or_else(|| "https://api.openweathermap.org/data/2.5".into()),
            repair: if strip { Repair::StripBackslashes } else { Repair::None },
            session_ttl: session_ttl(
                parse_or(var("SESSION_TTL_DAYS"), 30).context("SESSION_TTL_DAYS must be a number")?,
            )?,
        })
    }

    pub fn call_options(&self) -> CallOptions {
        CallOptions {
            api_key: self.llm_api_key.clone(),
            model: self.llm_model.clone(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            timeout: self.llm_timeout,
        }
    }
}

fn session_ttl(days: i64) -> Result<chrono::Duration> {
    if !(1..=MAX_SESSION_TTL_DAYS).contains(&days) {
        anyhow::bail!("SESSION_TTL_DAYS must be between 1 and {MAX_SESSION_TTL_DAYS}, got {days}");
    }
    chrono::Duration::try_days(days).context("SESSION_TTL_DAYS is out of range")
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => Ok(v.trim().parse()?),
        None => Ok(default),
    }
}
