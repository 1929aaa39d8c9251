use crate::models::{Phase, PipelineEvent, RunSummary};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Called from the run's coordinating thread, never the host's.
pub trait EventSink: Send + Sync {
    fn on_progress(&self, phase: Phase, current: usize, total: usize);
    fn on_phase(&self, phase: Phase);
    fn on_log(&self, message: &str);
    fn on_finished(&self, summary: &RunSummary);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_progress(&self, phase: Phase, current: usize, total: usize) {
        log::debug!("{phase} {current}/{total}");
    }

    fn on_phase(&self, phase: Phase) {
        log::info!("{phase}");
    }

    fn on_log(&self, message: &str) {
        log::info!("{message}");
    }

    fn on_finished(&self, summary: &RunSummary) {
        log::info!(
            "Run {} finished {:?}: {} photos, {} new tags",
            summary.run_id,
            summary.status,
            summary.photos_processed,
            summary.tags_created
        );
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: PipelineEvent) {
        // receiver gone
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_progress(&self, phase: Phase, current: usize, total: usize) {
        self.send(PipelineEvent::Progress {
            phase,
            current,
            total,
        });
    }

    fn on_phase(&self, phase: Phase) {
        self.send(PipelineEvent::Phase { phase });
    }

    fn on_log(&self, message: &str) {
        self.send(PipelineEvent::Log {
            message: message.to_string(),
        });
    }

    fn on_finished(&self, summary: &RunSummary) {
        self.send(PipelineEvent::Finished {
            summary: summary.clone(),
        });
    }
}

#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn on_progress(&self, phase: Phase, current: usize, total: usize) {
        for sink in &self.sinks {
            sink.on_progress(phase, current, total);
        }
    }

    fn on_phase(&self, phase: Phase) {
        for sink in &self.sinks {
            sink.on_phase(phase);
        }
    }

    fn on_log(&self, message: &str) {
        for sink in &self.sinks {
            sink.on_log(message);
        }
    }

    fn on_finished(&self, summary: &RunSummary) {
        for sink in &self.sinks {
            sink.on_finished(summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn channel_sink_preserves_order() {
        let (tx, rx) = unbounded();
        let sink = ChannelSink::new(tx);
        sink.on_phase(Phase::Scanning);
        sink.on_progress(Phase::Extracting, 1, 2);
        sink.on_log("hello");

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PipelineEvent::Phase {
                    phase: Phase::Scanning
                },
                PipelineEvent::Progress {
                    phase: Phase::Extracting,
                    current: 1,
                    total: 2
                },
                PipelineEvent::Log {
                    message: "hello".into()
                },
            ]
        );
    }

    #[test]
    fn channel_sink_ignores_closed_receiver() {
        let (tx, rx) = unbounded();
        drop(rx);
        ChannelSink::new(tx).on_log("nobody listening");
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let (tx_a, rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        let fanout = FanoutSink::new(vec![
            Arc::new(ChannelSink::new(tx_a)),
            Arc::new(ChannelSink::new(tx_b)),
            Arc::new(LogSink),
        ]);
        fanout.on_phase(Phase::Persisting);
        assert_eq!(rx_a.try_iter().count(), 1);
        assert_eq!(rx_b.try_iter().count(), 1);
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&PipelineEvent::Log {
            message: "skipped".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"log","message":"skipped"}"#);
    }
}
