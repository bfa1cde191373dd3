//! Result sink that records into several sinks.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use arqonz_jobs::{Artifact, ResultSink, SinkError};

/// Records each artifact into every inner sink concurrently.
///
/// A failing sink does not stop the others; the first error in sink order
/// is returned once all have finished.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl ResultSink for FanoutSink {
    async fn record(&self, artifact: &Artifact) -> Result<(), SinkError> {
        let results = join_all(self.sinks.iter().map(|sink| sink.record(artifact))).await;

        let mut first_error = None;
        for e in results.into_iter().filter_map(Result::err) {
            warn!("Sink failed for {}: {}", artifact.url, e);
            first_error.get_or_insert(e);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
        fail: Option<&'static str>,
    }

    impl CountingSink {
        fn new(fail: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl ResultSink for CountingSink {
        async fn record(&self, _artifact: &Artifact) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail {
                Some(msg) => Err(SinkError(msg.into())),
                None => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_all_sinks_tried_first_error_returned() {
        let a = CountingSink::new(Some("history down"));
        let b = CountingSink::new(Some("credits down"));
        let c = CountingSink::new(None);
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone()).with(c.clone());

        let err = fanout
            .record(&Artifact::new("https://cdn/x.png"))
            .await
            .unwrap_err();
        assert_eq!(err, SinkError("history down".into()));
        for sink in [&a, &b, &c] {
            assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_empty_fanout_succeeds() {
        assert!(FanoutSink::new()
            .record(&Artifact::new("https://cdn/x.png"))
            .await
            .is_ok());
    }
}
