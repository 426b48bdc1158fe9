//! End-to-end construction of a report envelope from sample telemetry,
//! through tree building, normalization, batching and wire encoding.
use std::collections::HashMap;
use std::time::Duration;
use std::time::SystemTime;

use prost::Message;
use usage_relay::batch::ReportBatcher;
use usage_relay::proto;
use usage_relay::proto::trace::node;
use usage_relay::signature;
use usage_relay::telemetry::ClientInfo;
use usage_relay::telemetry::ExecutionError;
use usage_relay::telemetry::HttpInfo;
use usage_relay::telemetry::ResolverSpan;
use usage_relay::telemetry::TelemetryRecord;
use usage_relay::tree::TraceTreeBuilder;

fn sample_record() -> TelemetryRecord {
    let start_time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    TelemetryRecord {
        query_text: "query Hello {\n  hello\n}".to_string(),
        operation_name: Some("Hello".to_string()),
        variables: None,
        client: ClientInfo {
            name: Some("integration-test".to_string()),
            version: Some("1.0".to_string()),
            address: None,
            reference_id: None,
        },
        http: HttpInfo {
            method: "POST".to_string(),
            host: "www.example.com".to_string(),
            path: "/graphql".to_string(),
            secure: true,
            protocol_version: "1.1".to_string(),
            request_headers: Some(HashMap::from([(
                "user-agent".to_string(),
                vec!["Foo".to_string()],
            )])),
        },
        duration_ns: 500_000,
        start_time,
        end_time: start_time + Duration::from_micros(500),
        resolver_spans: vec![ResolverSpan {
            path: vec!["hello".into()],
            parent_type: "Query".to_string(),
            return_type: "String".to_string(),
            field_name: "hello".to_string(),
            start_offset_ns: 1_000,
            duration_ns: 2_000,
        }],
        errors: vec![],
    }
}

#[test]
fn a_record_becomes_a_decodable_report() {
    let record = sample_record();
    let trace = TraceTreeBuilder::build(&record);
    let key = signature::normalize(&record.query_text, record.operation_name.as_deref());

    let mut batcher = ReportBatcher::default();
    batcher.add(key.clone(), trace);

    let report = proto::Report {
        header: Some(proto::ReportHeader {
            graph_ref: "my-graph@current".to_string(),
            hostname: "test-host".to_string(),
            agent_version: "usage-relay@test".to_string(),
            runtime_version: "rust".to_string(),
            ..Default::default()
        }),
        traces_per_query: batcher.build(),
        end_time: Some(SystemTime::now().into()),
        operation_count: 1,
    };

    let encoded = report.encode_to_vec();
    assert!(!encoded.is_empty());
    let decoded = proto::Report::decode(encoded.as_slice()).expect("report must decode");
    assert_eq!(decoded, report);

    assert_eq!(key, "# Hello\nquery Hello { hello }");
    let group = &decoded.traces_per_query[&key];
    assert_eq!(group.trace.len(), 1);

    let trace = &group.trace[0];
    assert_eq!(trace.client_name, "integration-test");
    assert_eq!(trace.duration_ns, 500_000);

    let root = trace.root.as_ref().expect("trace must have a root");
    assert_eq!(root.child.len(), 1);
    let hello = &root.child[0];
    assert_eq!(
        hello.id,
        Some(node::Id::ResponseName("hello".to_string()))
    );
    assert_eq!(hello.start_time, 1_000);
    assert_eq!(hello.end_time, 3_000);

    let http = trace.http.as_ref().expect("trace must carry http data");
    assert_eq!(http.host, "www.example.com");
    assert_eq!(http.request_headers["user-agent"].value, vec!["Foo"]);
}

#[test]
fn batching_the_same_query_twice_groups_both_traces() {
    let record = sample_record();
    let key = signature::normalize(&record.query_text, record.operation_name.as_deref());

    let mut batcher = ReportBatcher::default();
    batcher.add(key.clone(), TraceTreeBuilder::build(&record));
    batcher.add(key.clone(), TraceTreeBuilder::build(&record));

    let batch = batcher.build();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[&key].trace.len(), 2);
}

#[test]
fn a_failed_request_without_spans_still_produces_a_trace() {
    let mut record = sample_record();
    record.resolver_spans.clear();
    record.errors.push(ExecutionError {
        message: "request failed".to_string(),
        ..Default::default()
    });

    let trace = TraceTreeBuilder::build(&record);
    let root = trace.root.expect("errors-only trace must have a root");
    assert_eq!(
        root.id,
        Some(node::Id::ResponseName("_errors".to_string()))
    );
    assert_eq!(root.error.len(), 1);
}
