use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8000";
pub const DEFAULT_AI_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_AI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub ai_api_key: String,
    pub ai_model: String,
    pub ai_base_url: String,
    pub ai_timeout_secs: u64,
    pub max_questions: usize,
    pub shuffle_options: bool,
    pub session_idle_minutes: i64,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            server_address: lookup("SERVER_ADDRESS")
                .unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string()),
            database_url: required(&lookup, "DATABASE_CONNECTION_STRING")?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            ai_api_key: required(&lookup, "AI_API_KEY")?,
            ai_model: lookup("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            ai_base_url: lookup("AI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_AI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            ai_timeout_secs: parse_or(&lookup, "AI_TIMEOUT_SECS", 120)?,
            max_questions: parse_or(&lookup, "MAX_QUESTIONS", 20)?,
            shuffle_options: parse_or(&lookup, "SHUFFLE_OPTIONS", true)?,
            session_idle_minutes: parse_or(&lookup, "SESSION_IDLE_MINUTES", 60)?,
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("Missing environment variable: {}", name)))
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
