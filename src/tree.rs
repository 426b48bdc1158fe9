//! Reconstruction of the hierarchical trace tree from flat resolver spans.
//!
//! Resolver timings arrive as a path-indexed list in discovery order; the
//! ingress wants a tree keyed by response shape. The builder replays the
//! spans into an arena of nodes, repairing gaps where an ancestor never
//! reported a span of its own, and only materializes the owned tree once
//! everything is attached.
use std::collections::HashMap;

use crate::proto;
use crate::proto::trace;
use crate::proto::trace::http::Method;
use crate::proto::trace::node;
use crate::telemetry::ExecutionError;
use crate::telemetry::HttpInfo;
use crate::telemetry::PathSegment;
use crate::telemetry::ResolverSpan;
use crate::telemetry::TelemetryRecord;

/// Response name used for the root when a trace consists of errors only.
const ERRORS_ROOT: &str = "_errors";

/// A response path canonicalized to a lookup key. `.` cannot appear in a
/// GraphQL name, so the joined form is unambiguous.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PathKey(String);

impl PathKey {
    fn new(segments: &[PathSegment]) -> Self {
        let mut joined = String::new();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                joined.push('.');
            }
            joined.push_str(&segment.to_string());
        }
        PathKey(joined)
    }

    fn root() -> Self {
        PathKey(String::new())
    }
}

type NodeId = usize;

struct NodeSlot {
    node: trace::Node,
    children: Vec<NodeId>,
}

/// Builds one [`proto::Trace`] from one [`TelemetryRecord`].
///
/// Construction cannot fail: malformed span paths and dangling error
/// paths degrade to root attachment instead of propagating. The
/// path-to-node index lives only for the duration of the build and is
/// discarded with the arena once the tree is assembled.
pub struct TraceTreeBuilder {
    arena: Vec<NodeSlot>,
    index: HashMap<PathKey, NodeId>,
    root: Option<NodeId>,
}

impl TraceTreeBuilder {
    pub fn build(record: &TelemetryRecord) -> proto::Trace {
        let mut builder = TraceTreeBuilder {
            arena: Vec::with_capacity(record.resolver_spans.len() + 1),
            index: HashMap::with_capacity(record.resolver_spans.len() + 1),
            root: None,
        };
        for span in &record.resolver_spans {
            builder.add_resolved_field(span);
        }
        for error in &record.errors {
            builder.attach_error(error);
        }
        builder.finish(record)
    }

    /// Records one resolver span, creating the node for its path along
    /// with any ancestors the flat span list never mentioned.
    fn add_resolved_field(&mut self, span: &ResolverSpan) {
        let key = PathKey::new(&span.path);
        // A re-visit of a known path refreshes the node in place. That
        // also covers the node having been synthesized earlier as a
        // missing ancestor: the real span fills in its timings.
        let id = match self.index.get(&key) {
            Some(&id) => id,
            None => self.insert_span_node(&span.path, key),
        };

        let node = &mut self.arena[id].node;
        node.r#type = span.return_type.clone();
        node.parent_type = span.parent_type.clone();
        node.start_time = span.start_offset_ns;
        node.end_time = span.start_offset_ns + span.duration_ns;
        if let Some(PathSegment::Field(response_name)) = span.path.last() {
            if *response_name != span.field_name {
                // The field was aliased; keep the schema name as well.
                node.original_field_name = span.field_name.clone();
            }
        }
    }

    /// Creates the node for `path` and hangs it off its resolved parent.
    fn insert_span_node(&mut self, path: &[PathSegment], key: PathKey) -> NodeId {
        let node = match path.last() {
            Some(PathSegment::Index(index)) => index_node(*index),
            Some(PathSegment::Field(name)) => named_node(name.clone()),
            // Spans carry non-empty paths by contract; an empty one maps
            // onto the root rather than corrupting the tree.
            None => return self.root_id(),
        };
        let id = self.push(node);
        self.index.insert(key, id);

        if path.len() == 1 {
            // Top-level fields hang directly off the trace root.
            let root = self.root_id();
            self.arena[root].children.push(id);
            return id;
        }

        // The logical parent drops the last segment, and also a trailing
        // list index: elements of a list attach through an index node
        // whose path never appears as a span of its own.
        let (ancestor_path, list_index) = match path[path.len() - 2] {
            PathSegment::Index(index) => (&path[..path.len() - 2], Some(index)),
            PathSegment::Field(_) => (&path[..path.len() - 1], None),
        };
        let mut parent = self.ensure_ancestor(ancestor_path);
        if let Some(index) = list_index {
            parent = self.ensure_index_child(parent, index, PathKey::new(&path[..path.len() - 1]));
        }
        self.arena[parent].children.push(id);
        id
    }

    /// Resolves the node for an ancestor path, creating every missing
    /// link on the way up until a known node or the root is reached.
    ///
    /// Spans can be sparse: a parent may never have reported a span of
    /// its own. Synthesized links are always named after the path
    /// segment, never index nodes; index ancestors are resolvable
    /// directly because they are created alongside their children.
    fn ensure_ancestor(&mut self, path: &[PathSegment]) -> NodeId {
        if path.is_empty() {
            return self.root_id();
        }
        let key = PathKey::new(path);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let name = path[path.len() - 1].to_string();
        let parent = self.ensure_ancestor(&path[..path.len() - 1]);
        let id = self.push(named_node(name));
        self.index.insert(key, id);
        self.arena[parent].children.push(id);
        id
    }

    /// Locates or creates the index node a list element attaches through.
    fn ensure_index_child(&mut self, parent: NodeId, index: u32, key: PathKey) -> NodeId {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.push(index_node(index));
        self.index.insert(key, id);
        self.arena[parent].children.push(id);
        id
    }

    /// Attaches an error to the node at its exact path, falling back to
    /// the root for pathless errors and paths nothing resolved.
    fn attach_error(&mut self, error: &ExecutionError) {
        let target = error
            .path
            .as_deref()
            .and_then(|path| self.index.get(&PathKey::new(path)).copied());
        let target = match target {
            Some(id) => id,
            None => self.error_root_id(),
        };
        self.arena[target].node.error.push(wire_error(error));
    }

    /// The synthetic root, created on first use.
    fn root_id(&mut self) -> NodeId {
        match self.root {
            Some(id) => id,
            None => {
                let id = self.push(trace::Node::default());
                self.index.insert(PathKey::root(), id);
                self.root = Some(id);
                id
            }
        }
    }

    /// Like [`Self::root_id`], but a trace without any resolver spans
    /// gets a root named `_errors` to hold what is attached to it.
    fn error_root_id(&mut self) -> NodeId {
        match self.root {
            Some(id) => id,
            None => {
                let id = self.push(named_node(ERRORS_ROOT.to_string()));
                self.index.insert(PathKey::root(), id);
                self.root = Some(id);
                id
            }
        }
    }

    fn push(&mut self, node: trace::Node) -> NodeId {
        self.arena.push(NodeSlot {
            node,
            children: Vec::new(),
        });
        self.arena.len() - 1
    }

    /// Moves the finished tree out of the arena and fills in the trace
    /// envelope from the record's request metadata.
    fn finish(mut self, record: &TelemetryRecord) -> proto::Trace {
        let root = self.root.map(|id| self.take_node(id));
        let details = if record.variables.is_some() || record.operation_name.is_some() {
            Some(trace::Details {
                variables_json: record.variables.clone().unwrap_or_default(),
                operation_name: record.operation_name.clone().unwrap_or_default(),
            })
        } else {
            None
        };

        proto::Trace {
            start_time: Some(record.start_time.into()),
            end_time: Some(record.end_time.into()),
            duration_ns: record.duration_ns,
            root,
            details,
            client_name: record.client.name.clone().unwrap_or_default(),
            client_version: record.client.version.clone().unwrap_or_default(),
            client_address: record.client.address.clone().unwrap_or_default(),
            client_reference_id: record.client.reference_id.clone().unwrap_or_default(),
            http: Some(wire_http(&record.http)),
        }
    }

    fn take_node(&mut self, id: NodeId) -> trace::Node {
        let children = std::mem::take(&mut self.arena[id].children);
        let mut node = std::mem::take(&mut self.arena[id].node);
        node.child = children
            .into_iter()
            .map(|child| self.take_node(child))
            .collect();
        node
    }
}

fn named_node(response_name: String) -> trace::Node {
    trace::Node {
        id: Some(node::Id::ResponseName(response_name)),
        ..Default::default()
    }
}

fn index_node(index: u32) -> trace::Node {
    trace::Node {
        id: Some(node::Id::Index(index)),
        ..Default::default()
    }
}

fn wire_error(error: &ExecutionError) -> trace::Error {
    trace::Error {
        message: error
            .debug_message
            .clone()
            .unwrap_or_else(|| error.message.clone()),
        location: error
            .locations
            .iter()
            .map(|location| trace::Location {
                line: location.line,
                column: location.column,
            })
            .collect(),
        time_ns: 0,
        json: serde_json::to_string(error).unwrap_or_default(),
    }
}

fn wire_http(http: &HttpInfo) -> trace::Http {
    let method = match http.method.to_uppercase().as_str() {
        "OPTIONS" => Method::Options,
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "DELETE" => Method::Delete,
        "TRACE" => Method::Trace,
        "CONNECT" => Method::Connect,
        "PATCH" => Method::Patch,
        _ => Method::Unknown,
    };
    let request_headers = http
        .request_headers
        .iter()
        .flatten()
        .map(|(name, values)| {
            (
                name.to_lowercase(),
                trace::http::Values {
                    value: values.clone(),
                },
            )
        })
        .collect();

    trace::Http {
        method: method.into(),
        host: http.host.clone(),
        path: http.path.clone(),
        request_headers,
        response_headers: Default::default(),
        status_code: 0,
        secure: http.secure,
        protocol: http.protocol_version.clone(),
    }
}
