//! Normalization of query text into a stable grouping signature.
use once_cell::sync::Lazy;
use regex::Regex;
use sha1::Digest;
use sha1::Sha1;

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern must compile"));

static OPERATION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:query|mutation)\s+(\w+)").expect("operation name pattern must compile")
});

static INTROSPECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*query[^{]*\{\s*(?:\w+:\s*)?__schema\s*\{")
        .expect("introspection pattern must compile")
});

/// Derives the signature under which traces of this query are grouped.
///
/// Whitespace runs collapse to single spaces and the result is prefixed
/// with a `# <operation name>` comment line, the form the ingress
/// expects. An anonymous operation falls back to the name parsed from
/// the query text, and failing that to a content hash, so the signature
/// is deterministic for identical input.
pub fn normalize(query_text: &str, operation_name: Option<&str>) -> String {
    let collapsed = WHITESPACE.replace_all(query_text, " ");
    let trimmed = collapsed.trim();

    let name = match operation_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => match OPERATION_NAME.captures(trimmed) {
            Some(captures) => captures[1].to_string(),
            None => hex::encode(Sha1::digest(trimmed.as_bytes())),
        },
    };

    format!("# {name}\n{trimmed}")
}

/// Whether the query only asks for the schema itself. Introspection
/// traffic is not worth reporting upstream.
pub fn is_introspection(query_text: &str) -> bool {
    INTROSPECTION.is_match(query_text)
}
