//! Wire format of the usage-reporting ingress.
//!
//! These messages mirror the ingress' published reporting schema; field
//! numbers must never change. They are written out in the shape `prost`
//! would generate so that the rest of the crate can treat them exactly
//! like generated code.

/// A timing trace for a single operation, plus the request metadata the
/// ingress expects alongside it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Trace {
    #[prost(message, optional, tag = "4")]
    pub start_time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub end_time: ::core::option::Option<::prost_types::Timestamp>,
    /// Wall clock time for the operation, in nanoseconds.
    #[prost(uint64, tag = "11")]
    pub duration_ns: u64,
    #[prost(message, optional, tag = "14")]
    pub root: ::core::option::Option<trace::Node>,
    #[prost(message, optional, tag = "6")]
    pub details: ::core::option::Option<trace::Details>,
    #[prost(string, tag = "7")]
    pub client_name: ::prost::alloc::string::String,
    #[prost(string, tag = "8")]
    pub client_version: ::prost::alloc::string::String,
    #[prost(string, tag = "9")]
    pub client_address: ::prost::alloc::string::String,
    #[prost(string, tag = "23")]
    pub client_reference_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "10")]
    pub http: ::core::option::Option<trace::Http>,
}

/// Nested message and enum types in `Trace`.
pub mod trace {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Details {
        /// The variables associated with this query, as a map from name to
        /// JSON-encoded value. A value masked by the reporting agent is
        /// sent as the empty string, which is distinct from `""` (a
        /// variable containing the empty string).
        #[prost(map = "string, string", tag = "4")]
        pub variables_json: ::std::collections::HashMap<
            ::prost::alloc::string::String,
            ::prost::alloc::string::String,
        >,
        #[prost(string, tag = "3")]
        pub operation_name: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Error {
        #[prost(string, tag = "1")]
        pub message: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "2")]
        pub location: ::prost::alloc::vec::Vec<Location>,
        #[prost(uint64, tag = "3")]
        pub time_ns: u64,
        /// Full JSON rendition of the error, kept for auditing.
        #[prost(string, tag = "4")]
        pub json: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Location {
        #[prost(uint32, tag = "1")]
        pub line: u32,
        #[prost(uint32, tag = "2")]
        pub column: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Http {
        #[prost(enumeration = "http::Method", tag = "1")]
        pub method: i32,
        #[prost(string, tag = "2")]
        pub host: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub path: ::prost::alloc::string::String,
        /// Should exclude manual blacklist ("authorization", "cookie", etc.)
        #[prost(map = "string, message", tag = "4")]
        pub request_headers: ::std::collections::HashMap<
            ::prost::alloc::string::String,
            http::Values,
        >,
        #[prost(map = "string, message", tag = "5")]
        pub response_headers: ::std::collections::HashMap<
            ::prost::alloc::string::String,
            http::Values,
        >,
        #[prost(uint32, tag = "6")]
        pub status_code: u32,
        #[prost(bool, tag = "8")]
        pub secure: bool,
        #[prost(string, tag = "9")]
        pub protocol: ::prost::alloc::string::String,
    }

    /// Nested message and enum types in `HTTP`.
    pub mod http {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Values {
            #[prost(string, repeated, tag = "1")]
            pub value: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
        }

        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Method {
            Unknown = 0,
            Options = 1,
            Get = 2,
            Head = 3,
            Post = 4,
            Put = 5,
            Delete = 6,
            Trace = 7,
            Connect = 8,
            Patch = 9,
        }
    }

    /// One node of the tree of field resolutions. Nodes are either named
    /// fields (identified by their response key) or list positions.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Node {
        /// The name of the field (as in the response, so after aliasing)
        /// if this is a field node, or the index if this is a list node.
        #[prost(oneof = "node::Id", tags = "1, 2")]
        pub id: ::core::option::Option<node::Id>,
        /// The field's return type; e.g. "String!" for `username: String!`.
        #[prost(string, tag = "3")]
        pub r#type: ::prost::alloc::string::String,
        /// The type of the parent node; e.g. "User" for a field of `User`.
        #[prost(string, tag = "13")]
        pub parent_type: ::prost::alloc::string::String,
        /// Relative to the trace's start_time, in nanoseconds.
        #[prost(uint64, tag = "8")]
        pub start_time: u64,
        /// Relative to the trace's start_time, in nanoseconds.
        #[prost(uint64, tag = "9")]
        pub end_time: u64,
        #[prost(message, repeated, tag = "11")]
        pub error: ::prost::alloc::vec::Vec<Error>,
        #[prost(message, repeated, tag = "12")]
        pub child: ::prost::alloc::vec::Vec<Node>,
        /// The field's name prior to aliasing; only set when it differs
        /// from the response name.
        #[prost(string, tag = "14")]
        pub original_field_name: ::prost::alloc::string::String,
    }

    /// Nested message and enum types in `Node`.
    pub mod node {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Id {
            #[prost(string, tag = "1")]
            ResponseName(::prost::alloc::string::String),
            #[prost(uint32, tag = "2")]
            Index(u32),
        }
    }
}

/// The collection of traces recorded for one normalized query signature.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TracesAndStats {
    #[prost(message, repeated, tag = "1")]
    pub trace: ::prost::alloc::vec::Vec<Trace>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportHeader {
    /// The graph reference for this report: `<graph id>@<variant>`.
    #[prost(string, tag = "12")]
    pub graph_ref: ::prost::alloc::string::String,
    /// The hostname of the machine running this agent.
    #[prost(string, tag = "5")]
    pub hostname: ::prost::alloc::string::String,
    /// The reporting agent, e.g. "usage-relay@0.1.0".
    #[prost(string, tag = "6")]
    pub agent_version: ::prost::alloc::string::String,
    #[prost(string, tag = "7")]
    pub service_version: ::prost::alloc::string::String,
    #[prost(string, tag = "8")]
    pub runtime_version: ::prost::alloc::string::String,
    #[prost(string, tag = "9")]
    pub uname: ::prost::alloc::string::String,
    #[prost(string, tag = "11")]
    pub executable_schema_id: ::prost::alloc::string::String,
}

/// The report envelope sent to the ingress: one header plus all traces
/// gathered during the reporting window, keyed by query signature.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Report {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReportHeader>,
    #[prost(map = "string, message", tag = "5")]
    pub traces_per_query: ::std::collections::HashMap<
        ::prost::alloc::string::String,
        TracesAndStats,
    >,
    /// The time at which the report was assembled, just before sending.
    #[prost(message, optional, tag = "2")]
    pub end_time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(uint64, tag = "6")]
    pub operation_count: u64,
}
