//! Client configuration from the environment

use crate::render::DEFAULT_TOOL_OUTPUT_LIMIT;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Which tools to attach to each request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPreference {
    /// Everything the catalog advertises
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub backend_url: String,
    pub tools: ToolPreference,
    pub connect_timeout: Duration,
    /// Character cap for opaque tool output in the terminal
    pub tool_output_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            tools: ToolPreference::All,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            tool_output_limit: DEFAULT_TOOL_OUTPUT_LIMIT,
        }
    }
}

impl ClientConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set to a value
    /// that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unparseable timeout or output
    /// limit.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend_url = lookup("RESEARCH_CHAT_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.backend_url);

        // Unset selects everything; set-but-empty selects nothing
        let tools = match lookup("RESEARCH_CHAT_TOOLS") {
            None => ToolPreference::All,
            Some(list) => ToolPreference::Named(
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect(),
            ),
        };

        let connect_timeout = match lookup("RESEARCH_CHAT_CONNECT_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number(
                "RESEARCH_CHAT_CONNECT_TIMEOUT_SECS",
                &raw,
            )?),
            None => defaults.connect_timeout,
        };

        let tool_output_limit = match lookup("RESEARCH_CHAT_TOOL_OUTPUT_LIMIT") {
            Some(raw) => parse_number("RESEARCH_CHAT_TOOL_OUTPUT_LIMIT", &raw)?,
            None => defaults.tool_output_limit,
        };

        Ok(Self {
            backend_url,
            tools,
            connect_timeout,
            tool_output_limit,
        })
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        expected: "a non-negative integer",
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]).unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("RESEARCH_CHAT_URL", " http://backend:9000 "),
            ("RESEARCH_CHAT_TOOLS", "search_web, search_arxiv,"),
            ("RESEARCH_CHAT_CONNECT_TIMEOUT_SECS", "3"),
            ("RESEARCH_CHAT_TOOL_OUTPUT_LIMIT", "200"),
        ])
        .unwrap();

        assert_eq!(cfg.backend_url, "http://backend:9000");
        assert_eq!(
            cfg.tools,
            ToolPreference::Named(vec!["search_web".into(), "search_arxiv".into()])
        );
        assert_eq!(cfg.connect_timeout, Duration::from_secs(3));
        assert_eq!(cfg.tool_output_limit, 200);
    }

    #[test]
    fn test_empty_tool_list_selects_nothing() {
        let cfg = config(&[("RESEARCH_CHAT_TOOLS", "")]).unwrap();
        assert_eq!(cfg.tools, ToolPreference::Named(Vec::new()));
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = config(&[("RESEARCH_CHAT_CONNECT_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "RESEARCH_CHAT_CONNECT_TIMEOUT_SECS",
                ..
            }
        ));
    }
}
