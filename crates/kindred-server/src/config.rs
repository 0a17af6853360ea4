use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use kindred_engine::EngineConfig;
use kindred_push::dispatcher::DEFAULT_PUSH_TIMEOUT;
use kindred_push::gateway::EXPO_PUSH_URL;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub service_key: Option<String>,
    pub push_url: String,
    pub push_access_token: Option<String>,
    pub push_timeout: Duration,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = get("KINDRED_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("KINDRED_JWT_SECRET is unset or still a placeholder; it must match the auth service's secret");
        }

        let host = get("KINDRED_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&get, "KINDRED_PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            max_proposals: parse_or(&get, "KINDRED_MATCH_LIMIT", defaults.max_proposals)?,
            min_score: parse_or(&get, "KINDRED_MATCH_MIN_SCORE", defaults.min_score)?,
            max_message_chars: parse_or(&get, "KINDRED_MAX_MESSAGE_CHARS", defaults.max_message_chars)?,
        };
        if engine.min_score > 100 {
            bail!("KINDRED_MATCH_MIN_SCORE must be within 0..=100");
        }

        Ok(Self {
            addr,
            db_path: get("KINDRED_DB_PATH").unwrap_or_else(|| "kindred.db".into()).into(),
            jwt_secret,
            service_key: get("KINDRED_SERVICE_KEY").filter(|k| !k.is_empty()),
            push_url: get("KINDRED_PUSH_URL").unwrap_or_else(|| EXPO_PUSH_URL.into()),
            push_access_token: get("KINDRED_PUSH_ACCESS_TOKEN").filter(|t| !t.is_empty()),
            push_timeout: parse_or(&get, "KINDRED_PUSH_TIMEOUT_SECS", DEFAULT_PUSH_TIMEOUT.as_secs())
                .map(Duration::from_secs)?,
            engine,
        })
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn placeholder_secrets_are_refused() {
        assert!(config(&[]).is_err());
        assert!(config(&[("KINDRED_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("KINDRED_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.addr.port(), 3000);
        assert_eq!(cfg.engine, EngineConfig::default());
        assert_eq!(cfg.push_timeout, Duration::from_secs(5));
        assert_eq!(cfg.push_url, EXPO_PUSH_URL);
        assert!(cfg.service_key.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("KINDRED_JWT_SECRET", "s3cret"),
            ("KINDRED_PORT", "8088"),
            ("KINDRED_MATCH_LIMIT", "3"),
            ("KINDRED_MATCH_MIN_SCORE", "60"),
            ("KINDRED_PUSH_TIMEOUT_SECS", "2"),
            ("KINDRED_SERVICE_KEY", "k"),
        ])
        .unwrap();
        assert_eq!(cfg.addr.port(), 8088);
        assert_eq!(cfg.engine.max_proposals, 3);
        assert_eq!(cfg.engine.min_score, 60);
        assert_eq!(cfg.push_timeout, Duration::from_secs(2));
        assert_eq!(cfg.service_key.as_deref(), Some("k"));
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(config(&[("KINDRED_JWT_SECRET", "s"), ("KINDRED_PORT", "eighty")]).is_err());
        assert!(config(&[("KINDRED_JWT_SECRET", "s"), ("KINDRED_MATCH_MIN_SCORE", "101")]).is_err());
    }
}
