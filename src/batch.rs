//! Grouping of built traces into report-ready batches.
use std::collections::HashMap;

use crate::proto::Trace;
use crate::proto::TracesAndStats;

/// Accumulates traces keyed by their normalized query signature.
///
/// Built once per delivery cycle and handed straight to the sender.
/// Traces are kept in insertion order within a signature; repeated
/// identical signatures from separate requests are expected and never
/// deduplicated.
#[derive(Default)]
pub struct ReportBatcher {
    traces_per_query: HashMap<String, TracesAndStats>,
}

impl ReportBatcher {
    pub fn add(&mut self, signature: String, trace: Trace) {
        self.traces_per_query
            .entry(signature)
            .or_default()
            .trace
            .push(trace);
    }

    pub fn is_empty(&self) -> bool {
        self.traces_per_query.is_empty()
    }

    pub fn build(self) -> HashMap<String, TracesAndStats> {
        self.traces_per_query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(duration_ns: u64) -> Trace {
        Trace {
            duration_ns,
            ..Default::default()
        }
    }

    #[test]
    fn traces_group_under_their_signature() {
        let mut batcher = ReportBatcher::default();
        batcher.add("# Foo\nquery Foo { x }".to_string(), trace(1));
        batcher.add("# Bar\nquery Bar { y }".to_string(), trace(2));
        let batch = batcher.build();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch["# Foo\nquery Foo { x }"].trace.len(), 1);
    }

    #[test]
    fn repeated_signatures_accumulate_in_insertion_order() {
        let mut batcher = ReportBatcher::default();
        batcher.add("# Foo\nquery Foo { x }".to_string(), trace(1));
        batcher.add("# Foo\nquery Foo { x }".to_string(), trace(2));
        let batch = batcher.build();
        let traces = &batch["# Foo\nquery Foo { x }"].trace;
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].duration_ns, 1);
        assert_eq!(traces[1].duration_ns, 2);
    }

    #[test]
    fn an_unused_batcher_builds_an_empty_batch() {
        let batcher = ReportBatcher::default();
        assert!(batcher.is_empty());
        assert!(batcher.build().is_empty());
    }
}
