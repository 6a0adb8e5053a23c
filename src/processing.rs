//! Event classification stage.
//!
//! Sits between the producers and storage: receives every event from the
//! ingest channel, classifies it for the logs, and forwards it to the
//! storage channel. Classification never filters: unknown and unhandled
//! tags are logged and forwarded unchanged, so post-hoc tooling sees
//! everything the device produced. The only way an event is lost here is
//! the storage channel being full.

use tracing::{debug, info, trace, warn};

use crate::channel::{EventReceiver, EventSender};
use crate::error::BfpError;
use crate::event::{Event, EventType};

/// Counters the stage returns when its input closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    /// Events received from the ingest channel.
    pub received: u64,
    /// Events handed to the storage channel.
    pub forwarded: u64,
    /// Events dropped because the storage channel was full or closed.
    pub dropped: u64,
    /// Events carrying the `Unknown` tag.
    pub unknown: u64,
    /// Events whose tag has no dedicated handling.
    pub unhandled: u64,
}

/// Classify-and-forward stage.
pub struct ProcessingStage {
    input: EventReceiver,
    output: EventSender,
    stats: ProcessingStats,
}

impl ProcessingStage {
    /// Wires the stage between an ingest receiver and a storage sender.
    pub fn new(input: EventReceiver, output: EventSender) -> Self {
        Self {
            input,
            output,
            stats: ProcessingStats::default(),
        }
    }

    /// Runs until the ingest channel closes; returns the final counters.
    pub async fn run(mut self) -> ProcessingStats {
        info!("processing stage running");
        while let Some(event) = self.input.recv().await {
            self.stats.received += 1;
            self.classify(&event);
            match self.output.try_publish(event) {
                Ok(()) => self.stats.forwarded += 1,
                Err(BfpError::ChannelFull { .. }) => self.stats.dropped += 1,
                Err(_) => {
                    self.stats.dropped += 1;
                    debug!("storage channel closed; draining remaining events");
                }
            }
        }
        info!(
            received = self.stats.received,
            forwarded = self.stats.forwarded,
            dropped = self.stats.dropped,
            "processing stage drained"
        );
        self.stats
    }

    fn classify(&mut self, event: &Event) {
        match event.event_type {
            EventType::ExgData => {
                trace!(timestamp_us = event.timestamp_us, "EXG data event");
            }
            EventType::AuxData => {
                debug!(timestamp_us = event.timestamp_us, "aux data event");
            }
            EventType::Unknown => {
                self.stats.unknown += 1;
                warn!("unknown event type; forwarding unchanged");
            }
            other => {
                self.stats.unhandled += 1;
                debug!(event_type = ?other, "unhandled event type");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::event_channel;
    use crate::event::{AuxReading, AuxSource, EventPayload, ExgSample, Priority};
    use tracing_test::traced_test;

    fn exg_event(timestamp: u64) -> Event {
        Event::exg(
            timestamp,
            ExgSample {
                status: [0xC0, 0, 0],
                channels: [[0; 3]; 8],
                sequence: 0,
            },
        )
    }

    #[tokio::test]
    async fn forwards_every_classification_in_order() {
        let (ingest_tx, ingest_rx) = event_channel("ingest", 8).expect("valid channel");
        let (storage_tx, mut storage_rx) = event_channel("storage", 8).expect("valid channel");

        let events = vec![
            exg_event(1),
            Event::aux(
                2,
                AuxReading {
                    source: AuxSource::Pressure,
                    raw: 1013,
                },
            ),
            Event::unknown(3),
            Event::new(EventType::Audio, Priority::Low, 4, EventPayload::None),
        ];
        for event in &events {
            ingest_tx.try_publish(event.clone()).expect("fits");
        }
        drop(ingest_tx);

        let stats = ProcessingStage::new(ingest_rx, storage_tx).run().await;
        assert_eq!(stats.received, 4);
        assert_eq!(stats.forwarded, 4);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.unhandled, 1);

        for expected in &events {
            let got = storage_rx.recv().await.expect("forwarded");
            assert_eq!(&got, expected);
        }
    }

    #[tokio::test]
    async fn full_storage_channel_drops_new_events_only() {
        let (ingest_tx, ingest_rx) = event_channel("ingest", 8).expect("valid channel");
        let (storage_tx, mut storage_rx) = event_channel("storage", 1).expect("valid channel");

        for ts in 0..3 {
            ingest_tx.try_publish(exg_event(ts)).expect("fits");
        }
        drop(ingest_tx);

        let stats = ProcessingStage::new(ingest_rx, storage_tx).run().await;
        assert_eq!(stats.received, 3);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.dropped, 2);

        let survivor = storage_rx.recv().await.expect("first event retained");
        assert_eq!(survivor.timestamp_us, 0);
        assert!(storage_rx.recv().await.is_none());
    }

    #[traced_test]
    #[tokio::test]
    async fn unknown_events_warn_but_still_forward() {
        let (ingest_tx, ingest_rx) = event_channel("ingest", 2).expect("valid channel");
        let (storage_tx, mut storage_rx) = event_channel("storage", 2).expect("valid channel");

        ingest_tx.try_publish(Event::unknown(7)).expect("fits");
        drop(ingest_tx);

        let stats = ProcessingStage::new(ingest_rx, storage_tx).run().await;
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(
            storage_rx.recv().await.expect("forwarded").event_type,
            EventType::Unknown
        );
        assert!(logs_contain("unknown event type"));
    }
}
