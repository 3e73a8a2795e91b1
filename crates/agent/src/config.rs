use std::time::Duration;

use objwatch_core::protocol::LISTENER_PATTERN;

use crate::error::AgentError;

/// Default seconds between liveness pings.
const DEFAULT_PING_INTERVAL_SECS: u64 = 10;

/// Default seconds a liveness ping may go unanswered.
const DEFAULT_PING_TIMEOUT_SECS: u64 = 5;

/// Agent configuration from the command line and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Store WebSocket URL (positional argument).
    pub store_url: String,
    /// Pattern selecting listener objects (default: `listener/*`).
    pub listener_pattern: String,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

impl AgentConfig {
    /// Load configuration from positional `args` (program name excluded)
    /// and environment variables.
    ///
    /// | Env Var              | Default      |
    /// |----------------------|--------------|
    /// | `LISTENER_PATTERN`   | `listener/*` |
    /// | `PING_INTERVAL_SECS` | `10`         |
    /// | `PING_TIMEOUT_SECS`  | `5`          |
    pub fn from_args_and_env(args: impl IntoIterator<Item = String>) -> Result<Self, AgentError> {
        Self::from_sources(args, |key| std::env::var(key).ok())
    }

    /// Like [`AgentConfig::from_args_and_env`] with an explicit variable
    /// lookup.
    pub fn from_sources(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AgentError> {
        let store_url = args
            .into_iter()
            .next()
            .filter(|url| !url.trim().is_empty())
            .ok_or(AgentError::Usage)?;

        let listener_pattern = env("LISTENER_PATTERN")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| LISTENER_PATTERN.to_string());

        let ping_interval = secs_var(&env, "PING_INTERVAL_SECS", DEFAULT_PING_INTERVAL_SECS);
        let ping_timeout = secs_var(&env, "PING_TIMEOUT_SECS", DEFAULT_PING_TIMEOUT_SECS);

        Ok(Self {
            store_url,
            listener_pattern,
            ping_interval,
            ping_timeout,
        })
    }
}

fn secs_var(env: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Duration {
    let secs = match env(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => secs,
            _ => {
                tracing::warn!(key, value = %raw, default, "Invalid duration, using default");
                default
            }
        },
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(args: &[&str], vars: &[(&str, &str)]) -> Result<AgentConfig, AgentError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_sources(args.iter().map(|a| a.to_string()), |key| {
            vars.get(key).cloned()
        })
    }

    #[test]
    fn defaults_apply_without_env() {
        let config = load(&["ws://localhost:3000/objtalk"], &[]).unwrap();
        assert_eq!(config.store_url, "ws://localhost:3000/objtalk");
        assert_eq!(config.listener_pattern, "listener/*");
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = load(
            &["ws://store"],
            &[
                ("LISTENER_PATTERN", "rules/*"),
                ("PING_INTERVAL_SECS", "30"),
                ("PING_TIMEOUT_SECS", "2"),
            ],
        )
        .unwrap();
        assert_eq!(config.listener_pattern, "rules/*");
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.ping_timeout, Duration::from_secs(2));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = load(
            &["ws://store"],
            &[("PING_INTERVAL_SECS", "soon"), ("PING_TIMEOUT_SECS", "0")],
        )
        .unwrap();
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_url_is_a_usage_error() {
        assert_matches!(load(&[], &[]), Err(AgentError::Usage));
        assert_matches!(load(&[" "], &[]), Err(AgentError::Usage));
    }
}
