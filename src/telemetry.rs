//! The telemetry record handed over by the GraphQL integration layer,
//! plus the boundary helpers that shape raw request data into it.
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use serde::Deserialize;
use serde::Serialize;

use crate::config::Config;

/// One element of a response path: a field's response key, or a position
/// within a list value.
///
/// The distinction is carried by the runtime type, never inferred from
/// content, so a field literally named `"0"` stays a field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(u32),
    Field(String),
}

impl PathSegment {
    pub fn is_index(&self) -> bool {
        matches!(self, PathSegment::Index(_))
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_string())
    }
}

impl From<u32> for PathSegment {
    fn from(index: u32) -> Self {
        PathSegment::Index(index)
    }
}

/// A timing record for one field resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverSpan {
    /// Where the resolved value lives in the response. Never empty; the
    /// last segment is the response key (possibly an alias) or an index.
    pub path: Vec<PathSegment>,
    pub parent_type: String,
    pub return_type: String,
    /// The field name as declared in the schema, before any aliasing.
    pub field_name: String,
    pub start_offset_ns: u64,
    pub duration_ns: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// An error reported during execution, kept verbatim for auditing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_message: Option<String>,
    #[serde(default)]
    pub locations: Vec<ErrorLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

impl ClientInfo {
    /// Picks the client identification out of the request headers, using
    /// the `x-apollo-client-*` names with the `apollographql-client-*`
    /// names as fallback. Header names are expected lowercase.
    pub fn from_headers(headers: &HashMap<String, Vec<String>>) -> Self {
        let first = |name: &str| {
            headers
                .get(name)
                .and_then(|values| values.first())
                .cloned()
        };
        ClientInfo {
            name: first("x-apollo-client-name").or_else(|| first("apollographql-client-name")),
            version: first("x-apollo-client-version")
                .or_else(|| first("apollographql-client-version")),
            address: None,
            reference_id: first("x-apollo-client-reference-id"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpInfo {
    /// The request method name, e.g. "POST".
    pub method: String,
    pub host: String,
    pub path: String,
    pub secure: bool,
    pub protocol_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HashMap<String, Vec<String>>>,
}

/// Everything captured for one completed GraphQL operation.
///
/// Produced once by the integration layer when the request finishes and
/// treated as immutable from then on. This is also the queue wire format
/// (serialized as JSON).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub query_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Variable values, already stringified and redacted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<HashMap<String, String>>,
    #[serde(default)]
    pub client: ClientInfo,
    pub http: HttpInfo,
    pub duration_ns: u64,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    #[serde(default)]
    pub resolver_spans: Vec<ResolverSpan>,
    #[serde(default)]
    pub errors: Vec<ExecutionError>,
}

/// Stringifies variable values for reporting, masking what the
/// configuration excludes.
///
/// A masked variable is sent as the empty string, which is distinct from
/// a variable containing the empty string (sent as `""`). The
/// except-list wins over the only-list on conflict.
pub fn redact_variables(
    variables: &HashMap<String, serde_json::Value>,
    config: &Config,
) -> Option<HashMap<String, String>> {
    if !config.include_variables {
        return None;
    }

    let only = &config.variables_only_names;
    let except = &config.variables_except_names;
    let redacted = variables
        .iter()
        .map(|(name, value)| {
            let masked = (!only.is_empty() && !only.contains(name)) || except.contains(name);
            let rendered = if masked {
                String::new()
            } else {
                serde_json::to_string(value)
                    .unwrap_or_else(|_| "\"[Unable to convert value to JSON]\"".to_string())
            };
            (name.clone(), rendered)
        })
        .collect();

    Some(redacted)
}

/// Applies the header reporting policy: nothing unless enabled, and never
/// the excluded names. Header names are expected lowercase.
pub fn filter_request_headers(
    headers: &HashMap<String, Vec<String>>,
    config: &Config,
) -> Option<HashMap<String, Vec<String>>> {
    if !config.include_request_headers {
        return None;
    }

    Some(
        headers
            .iter()
            .filter(|(name, _)| !config.excluded_request_headers.contains(*name))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect(),
    )
}
