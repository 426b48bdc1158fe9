//! Configuration for the usage relay.
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("send mode \"{0}\" is not implemented; use \"sync\" or \"redis\"")]
    UnsupportedSendMode(String),

    #[error("an API key is required to submit usage reports")]
    MissingApiKey,

    #[error("could not read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// How and when telemetry leaves the process.
///
/// Resolved once at startup; nothing downstream compares mode strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum SendMode {
    /// Submit inline, within the request that produced the telemetry.
    Sync,
    /// Push onto the delivery queue; a separately scheduled drain submits.
    Queued,
    /// A mode this build does not support (for example `database`).
    /// Rejected during startup, keeping the name for the error message.
    Unsupported(String),
}

impl From<String> for SendMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sync" => SendMode::Sync,
            "redis" => SendMode::Queued,
            _ => SendMode::Unsupported(value),
        }
    }
}

impl Default for SendMode {
    fn default() -> Self {
        SendMode::Sync
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The service-scoped API key identifying the graph to report against.
    #[serde(default = "apollo_key_default")]
    pub apollo_key: Option<String>,

    /// Where usage reports are submitted.
    #[serde(default = "tracing_endpoint_default")]
    pub tracing_endpoint: Url,

    #[serde(default)]
    pub send_tracing_mode: SendMode,

    /// Overrides the machine hostname in the report header.
    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default = "graph_id_default")]
    pub apollo_graph_id: Option<String>,

    #[serde(default = "graph_variant_default")]
    pub apollo_graph_variant: String,

    /// Whether the integration should strip the tracing payload from the
    /// GraphQL response extensions once it has been captured.
    #[serde(default = "default_true")]
    pub mute_tracing_extensions: bool,

    #[serde(default)]
    pub include_variables: bool,

    /// When non-empty, only variables named here keep their values.
    #[serde(default)]
    pub variables_only_names: Vec<String>,

    /// Variables named here are always masked; wins over the only-list.
    #[serde(default)]
    pub variables_except_names: Vec<String>,

    #[serde(default)]
    pub include_request_headers: bool,

    /// Request headers to withhold from reports. Compared lowercase.
    #[serde(default = "excluded_request_headers_default")]
    pub excluded_request_headers: Vec<String>,

    /// Connection string for the queue store. Only used in queued mode.
    #[serde(default = "redis_url_default")]
    pub redis_url: String,

    /// The list key under which pending telemetry records accumulate.
    #[serde(default = "queue_key_default")]
    pub queue_key: String,

    /// How many records each drain iteration dequeues and submits.
    #[serde(default = "chunk_size_default")]
    pub chunk_size: usize,
}

fn apollo_key_default() -> Option<String> {
    std::env::var("APOLLO_KEY").ok()
}

fn tracing_endpoint_default() -> Url {
    Url::parse("https://usage-reporting.api.apollographql.com/api/ingress/traces")
        .expect("default ingress endpoint must parse")
}

fn graph_id_default() -> Option<String> {
    std::env::var("APOLLO_GRAPH_ID").ok()
}

fn graph_variant_default() -> String {
    std::env::var("APOLLO_GRAPH_VARIANT").unwrap_or_else(|_| "current".to_string())
}

fn default_true() -> bool {
    true
}

fn excluded_request_headers_default() -> Vec<String> {
    vec!["authentication".to_string()]
}

fn redis_url_default() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn queue_key_default() -> String {
    "usage_relay_pending_traces".to_string()
}

fn chunk_size_default() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apollo_key: apollo_key_default(),
            tracing_endpoint: tracing_endpoint_default(),
            send_tracing_mode: SendMode::default(),
            hostname: None,
            apollo_graph_id: graph_id_default(),
            apollo_graph_variant: graph_variant_default(),
            mute_tracing_extensions: true,
            include_variables: false,
            variables_only_names: Vec::new(),
            variables_except_names: Vec::new(),
            include_request_headers: false,
            excluded_request_headers: excluded_request_headers_default(),
            redis_url: redis_url_default(),
            queue_key: queue_key_default(),
            chunk_size: chunk_size_default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// The graph reference reported in the header: `<graph id>@<variant>`,
    /// or the bare variant when no graph id is configured (the API key
    /// already identifies the graph).
    pub fn graph_ref(&self) -> String {
        match &self.apollo_graph_id {
            Some(id) => format!("{}@{}", id, self.apollo_graph_variant),
            None => self.apollo_graph_variant.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_mode_parses_known_names() {
        assert_eq!(SendMode::from("sync".to_string()), SendMode::Sync);
        assert_eq!(SendMode::from("redis".to_string()), SendMode::Queued);
    }

    #[test]
    fn send_mode_preserves_unsupported_names() {
        assert_eq!(
            SendMode::from("database".to_string()),
            SendMode::Unsupported("database".to_string())
        );
    }

    #[test]
    fn config_defaults_are_usable() {
        let config: Config = serde_yaml::from_str("{}").expect("empty config must parse");
        assert_eq!(config.send_tracing_mode, SendMode::Sync);
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.apollo_graph_variant, "current");
        assert!(config.tracing_endpoint.as_str().contains("ingress"));
    }

    #[test]
    fn graph_ref_combines_id_and_variant() {
        let config = Config {
            apollo_graph_id: Some("my-graph".to_string()),
            apollo_graph_variant: "staging".to_string(),
            ..Config::default()
        };
        assert_eq!(config.graph_ref(), "my-graph@staging");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<Config, _> = serde_yaml::from_str("no_such_setting: true");
        assert!(parsed.is_err());
    }
}
