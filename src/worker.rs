//! The delivery pipeline tying tree building, batching, queueing and
//! sending together.
use std::ops::ControlFlow;

use thiserror::Error;

use crate::batch::ReportBatcher;
use crate::config::Config;
use crate::config::ConfigError;
use crate::config::SendMode;
use crate::queue::DeliveryQueue;
use crate::queue::DrainOutcome;
use crate::queue::QueueError;
use crate::sender::ReportSender;
use crate::sender::SenderError;
use crate::signature;
use crate::telemetry::TelemetryRecord;
use crate::tree::TraceTreeBuilder;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Send(#[from] SenderError),
}

/// Entry point for reporting completed operations.
///
/// In sync mode every record is built and submitted inline, on the
/// caller's thread. In queued mode records are parked in the delivery
/// queue and a separately scheduled [`Self::drain`] turns them into
/// reports.
pub struct UsageReporter {
    mode: SendMode,
    sender: ReportSender,
    queue: Option<DeliveryQueue>,
    chunk_size: usize,
}

impl UsageReporter {
    /// Resolves the configured send mode once and wires up the parts it
    /// needs. An unsupported mode is a fatal configuration error, raised
    /// here rather than on the request path.
    pub fn new(config: Config) -> Result<Self, DeliveryError> {
        let mode = match config.send_tracing_mode.clone() {
            SendMode::Unsupported(name) => {
                return Err(ConfigError::UnsupportedSendMode(name).into());
            }
            mode => mode,
        };
        let api_key = config
            .apollo_key
            .clone()
            .ok_or(ConfigError::MissingApiKey)?;
        let sender = ReportSender::new(&config, api_key)?;
        let queue = match mode {
            SendMode::Queued => Some(DeliveryQueue::new(&config.redis_url, &config.queue_key)?),
            _ => None,
        };
        Ok(Self {
            mode,
            sender,
            queue,
            chunk_size: config.chunk_size,
        })
    }

    /// Takes in one completed operation's telemetry.
    ///
    /// Failures to submit in sync mode are logged and swallowed: losing
    /// a trace must never fail the request that produced it.
    pub fn report(&mut self, record: TelemetryRecord) -> Result<(), DeliveryError> {
        if signature::is_introspection(&record.query_text) {
            tracing::debug!("skipping introspection query");
            return Ok(());
        }

        match self.mode {
            SendMode::Sync => {
                let trace = TraceTreeBuilder::build(&record);
                let key =
                    signature::normalize(&record.query_text, record.operation_name.as_deref());
                let mut batcher = ReportBatcher::default();
                batcher.add(key, trace);
                if let Err(err) = self.sender.send(batcher.build()) {
                    tracing::warn!("failed to send usage report: {err}");
                }
                Ok(())
            }
            SendMode::Queued => {
                let queue = self
                    .queue
                    .as_mut()
                    .expect("queued mode always has a queue, qed");
                queue.enqueue(std::slice::from_ref(&record))?;
                Ok(())
            }
            SendMode::Unsupported(ref name) => {
                // The constructor refuses unsupported modes; degrade to
                // the same error if one sneaks through regardless.
                Err(ConfigError::UnsupportedSendMode(name.clone()).into())
            }
        }
    }

    /// Drains the delivery queue, submitting one report per chunk.
    ///
    /// A chunk the ingress rejects as stale can never be delivered: it is
    /// dropped and the drain moves on, so one bad chunk does not block
    /// the healthy ones behind it. Any other failure puts the chunk back
    /// at the tail and ends the cycle, preserving at-least-once
    /// delivery. Returns the number of records taken off the queue,
    /// including dropped stale ones.
    pub fn drain(&mut self) -> Result<usize, DeliveryError> {
        let queue = match self.queue.as_mut() {
            Some(queue) => queue,
            None => return Ok(0),
        };
        let sender = &self.sender;
        let chunk_size = self.chunk_size;

        let outcome = queue.process_in_chunks(chunk_size, |chunk| {
            let mut batcher = ReportBatcher::default();
            for record in &chunk {
                let trace = TraceTreeBuilder::build(record);
                let key =
                    signature::normalize(&record.query_text, record.operation_name.as_deref());
                batcher.add(key, trace);
            }
            tracing::info!(records = chunk.len(), "submitting usage report chunk");
            match sender.send(batcher.build()) {
                Ok(()) => ControlFlow::Continue(()),
                Err(err) if err.is_stale_report() => {
                    tracing::warn!(
                        records = chunk.len(),
                        "dropping chunk rejected as stale: {err}"
                    );
                    ControlFlow::Continue(())
                }
                Err(err) => ControlFlow::Break((err, chunk)),
            }
        })?;

        match outcome {
            DrainOutcome::Drained(count) => Ok(count),
            DrainOutcome::Stopped((err, chunk)) => {
                // Put the unsent records back for the next cycle.
                queue.enqueue(&chunk)?;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::telemetry::ClientInfo;
    use crate::telemetry::HttpInfo;
    use crate::telemetry::ResolverSpan;

    fn record(query_text: &str) -> TelemetryRecord {
        TelemetryRecord {
            query_text: query_text.to_string(),
            operation_name: None,
            variables: None,
            client: ClientInfo::default(),
            http: HttpInfo {
                method: "POST".to_string(),
                host: "graph.example.com".to_string(),
                path: "/graphql".to_string(),
                secure: true,
                protocol_version: "1.1".to_string(),
                request_headers: None,
            },
            duration_ns: 1_000,
            start_time: SystemTime::UNIX_EPOCH,
            end_time: SystemTime::UNIX_EPOCH,
            resolver_spans: vec![ResolverSpan {
                path: vec!["hello".into()],
                parent_type: "Query".to_string(),
                return_type: "String".to_string(),
                field_name: "hello".to_string(),
                start_offset_ns: 10,
                duration_ns: 20,
            }],
            errors: vec![],
        }
    }

    fn reporter(mode: SendMode, outcomes: Vec<Result<(), SenderError>>) -> UsageReporter {
        let queue = match mode {
            SendMode::Queued => Some(DeliveryQueue::in_memory()),
            _ => None,
        };
        UsageReporter {
            mode,
            sender: ReportSender::with_mock(outcomes),
            queue,
            chunk_size: 2,
        }
    }

    fn queue_len(reporter: &mut UsageReporter) -> usize {
        reporter
            .queue
            .as_mut()
            .expect("test reporter must have a queue")
            .len()
            .expect("len must succeed")
    }

    fn transient_failure() -> SenderError {
        SenderError::Status {
            status: 503,
            body: "service unavailable".to_string(),
        }
    }

    fn stale_failure() -> SenderError {
        SenderError::Status {
            status: 400,
            body: "traces were rejected due to skewed timestamp".to_string(),
        }
    }

    #[test]
    fn sync_mode_submits_inline() {
        let mut reporter = reporter(SendMode::Sync, vec![]);
        reporter
            .report(record("query Foo { hello }"))
            .expect("report must succeed");

        let reports = reporter.sender.sent_reports();
        assert_eq!(reports.len(), 1);
        let group = &reports[0].traces_per_query["# Foo\nquery Foo { hello }"];
        assert_eq!(group.trace.len(), 1);
    }

    #[test]
    fn sync_mode_swallows_send_failures() {
        let mut reporter = reporter(SendMode::Sync, vec![Err(transient_failure())]);
        // The request that produced the telemetry must never see the failure.
        reporter
            .report(record("query Foo { hello }"))
            .expect("failures are logged, not raised");
    }

    #[test]
    fn introspection_queries_are_not_reported() {
        let mut reporter = reporter(SendMode::Sync, vec![]);
        reporter
            .report(record("query IntrospectionQuery { __schema { types { name } } }"))
            .expect("report must succeed");
        assert!(reporter.sender.sent_reports().is_empty());
    }

    #[test]
    fn queued_mode_defers_to_the_queue() {
        let mut reporter = reporter(SendMode::Queued, vec![]);
        reporter
            .report(record("query Foo { hello }"))
            .expect("report must succeed");
        assert!(reporter.sender.sent_reports().is_empty());
        assert_eq!(queue_len(&mut reporter), 1);
    }

    #[test]
    fn drain_submits_one_report_per_chunk() {
        let mut reporter = reporter(SendMode::Queued, vec![]);
        for _ in 0..3 {
            reporter
                .report(record("query Foo { hello }"))
                .expect("report must succeed");
        }

        let drained = reporter.drain().expect("drain must succeed");
        assert_eq!(drained, 3);
        assert_eq!(queue_len(&mut reporter), 0);
        // chunk_size is 2: two records, then one.
        assert_eq!(reporter.sender.sent_reports().len(), 2);
    }

    #[test]
    fn transient_failures_requeue_the_chunk_and_stop_the_cycle() {
        let mut reporter = reporter(SendMode::Queued, vec![Err(transient_failure())]);
        for name in ["{ a }", "{ b }", "{ c }"] {
            reporter.report(record(name)).expect("report must succeed");
        }

        let result = reporter.drain();
        assert!(matches!(result, Err(DeliveryError::Send(_))));
        // Nothing was lost: the failed chunk went back on the queue.
        assert_eq!(queue_len(&mut reporter), 3);

        // The failed chunk sits at the tail now, behind the unprocessed
        // record.
        let queue = reporter.queue.as_mut().expect("queue must exist");
        let requeued = queue.dequeue_chunk(3).expect("dequeue must succeed");
        let order: Vec<&str> = requeued
            .iter()
            .map(|record| record.query_text.as_str())
            .collect();
        assert_eq!(order, vec!["{ c }", "{ a }", "{ b }"]);
    }

    #[test]
    fn stale_chunks_are_dropped_and_the_drain_continues() {
        let mut reporter = reporter(SendMode::Queued, vec![Err(stale_failure()), Ok(())]);
        for name in ["{ a }", "{ b }", "{ c }"] {
            reporter.report(record(name)).expect("report must succeed");
        }

        let drained = reporter.drain().expect("drain must succeed");
        assert_eq!(drained, 3);
        // The stale chunk is gone for good; the healthy one was delivered.
        assert_eq!(queue_len(&mut reporter), 0);
        assert_eq!(reporter.sender.sent_reports().len(), 2);
    }

    #[test]
    fn drain_without_a_queue_is_a_no_op() {
        let mut reporter = reporter(SendMode::Sync, vec![]);
        assert_eq!(reporter.drain().expect("drain must succeed"), 0);
    }

    #[test]
    fn unsupported_mode_is_rejected_at_startup() {
        let config = Config {
            apollo_key: Some("service:test:key".to_string()),
            send_tracing_mode: SendMode::Unsupported("database".to_string()),
            ..Config::default()
        };
        let result = UsageReporter::new(config);
        assert!(matches!(
            result,
            Err(DeliveryError::Config(ConfigError::UnsupportedSendMode(_)))
        ));
    }

    #[test]
    fn missing_api_key_is_rejected_at_startup() {
        let config = Config {
            apollo_key: None,
            ..Config::default()
        };
        let result = UsageReporter::new(config);
        assert!(matches!(
            result,
            Err(DeliveryError::Config(ConfigError::MissingApiKey))
        ));
    }
}
