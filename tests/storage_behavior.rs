//! Storage stage behavior against a scripted volume.

mod common;

use std::time::Duration;

use tokio::sync::oneshot;

use bfp_logger::channel::event_channel;
use bfp_logger::codec::{BincodeCodec, EventCodec};
use bfp_logger::error::BfpError;
use bfp_logger::event::{Event, ExgSample};
use bfp_logger::identity::FixedIdentity;
use bfp_logger::storage::framing::RecordReader;
use bfp_logger::storage::volume::DirVolume;
use bfp_logger::storage::StorageStage;

use common::ScriptedVolume;

fn bench_identity() -> std::sync::Arc<FixedIdentity> {
    std::sync::Arc::new(FixedIdentity {
        boot_id: "boot-int".to_owned(),
        device_id: "bench".to_owned(),
    })
}

fn exg_event(sequence: u32) -> Event {
    Event::exg(
        u64::from(sequence) * 2_000,
        ExgSample {
            status: [0xC0, 0x00, 0x00],
            channels: [[sequence as u8, 0x22, 0x33]; 8],
            sequence,
        },
    )
}

fn decode_log(path: &std::path::Path) -> Vec<Event> {
    let data = std::fs::read(path).expect("log file");
    let mut reader = RecordReader::new(&data).expect("valid header");
    let events = (&mut reader)
        .map(|record| BincodeCodec.decode(record).expect("decode"))
        .collect();
    assert!(!reader.is_truncated());
    events
}

#[tokio::test]
async fn recording_fails_when_mount_and_format_both_fail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (volume, script) = ScriptedVolume::new(dir.path().join("card"));
    // The missing root already refuses the first mount; refuse the format
    // fallback too.
    script.fail_formats(1);

    let (_tx, rx) = event_channel("storage", 8).expect("valid channel");
    let (_terminate_tx, terminate_rx) = oneshot::channel();
    let stage = StorageStage::new(
        Box::new(volume),
        Box::new(BincodeCodec),
        bench_identity(),
        rx,
        terminate_rx,
        Duration::from_secs(3600),
        ".binpb",
    );

    let err = stage.run().await.expect_err("unmountable media is fatal");
    assert!(matches!(err, BfpError::MountFailed(_)));
}

#[tokio::test]
async fn corrupt_media_is_reformatted_and_recorded_onto() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("stale"), b"leftover").expect("seed junk");
    let (volume, script) = ScriptedVolume::new(dir.path());
    // Media is present but refuses its first mount; the format fallback
    // wipes it and the retry succeeds.
    script.fail_mounts(1);

    let (tx, rx) = event_channel("storage", 4).expect("valid channel");
    let (_terminate_tx, terminate_rx) = oneshot::channel();
    tx.try_publish(exg_event(0)).expect("publish");
    drop(tx);

    let stage = StorageStage::new(
        Box::new(volume),
        Box::new(BincodeCodec),
        bench_identity(),
        rx,
        terminate_rx,
        Duration::from_secs(3600),
        ".binpb",
    );
    let report = stage.run().await.expect("storage run");
    assert_eq!(report.session, 1);
    assert_eq!(report.records_written, 1);

    assert!(!dir.path().join("stale").exists());
    let written = decode_log(&dir.path().join("00000001/00000000.binpb"));
    assert_eq!(written, vec![exg_event(0)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_rotation_drops_records_until_the_next_tick() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (volume, script) = ScriptedVolume::new(dir.path());

    let (tx, rx) = event_channel("storage", 16).expect("valid channel");
    let (_terminate_tx, terminate_rx) = oneshot::channel();
    let stage = StorageStage::new(
        Box::new(volume),
        Box::new(BincodeCodec),
        bench_identity(),
        rx,
        terminate_rx,
        Duration::from_millis(200),
        ".binpb",
    );
    let worker = tokio::spawn(stage.run());

    // Two records into the first file: header + 2 appends.
    tx.try_publish(exg_event(0)).expect("publish");
    tx.try_publish(exg_event(1)).expect("publish");
    script.wait_until(|appends| appends >= 3).await;

    // The next rotation tick fails its header write.
    script.fail_appends(1);
    script.wait_until(|appends| appends >= 4).await;

    // Fileless window: these two drop.
    tx.try_publish(exg_event(2)).expect("publish");
    tx.try_publish(exg_event(3)).expect("publish");

    // The tick after that recovers, and appends flow again.
    script.wait_until(|appends| appends >= 5).await;
    tx.try_publish(exg_event(4)).expect("publish");
    script.wait_until(|appends| appends >= 6).await;
    drop(tx);

    let report = worker.await.expect("join").expect("storage run");
    assert_eq!(report.rotations, 2);
    assert_eq!(report.rotate_failures, 1);
    assert_eq!(report.records_written, 3);
    assert_eq!(report.dropped_no_file, 2);

    let session = dir.path().join("00000001");
    let first = decode_log(&session.join("00000000.binpb"));
    assert_eq!(first.len(), 2);
    // The failed attempt consumed an index; nothing was written under it.
    assert!(!session.join("00000001.binpb").exists());
    let recovered = decode_log(&session.join("00000002.binpb"));
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0], exg_event(4));
}

#[tokio::test]
async fn five_events_into_a_four_slot_channel_keep_the_oldest_four() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (tx, rx) = event_channel("storage", 4).expect("valid channel");
    let (_terminate_tx, terminate_rx) = oneshot::channel();

    // The stage is not draining yet, so the channel really fills.
    let events: Vec<Event> = (0..5).map(exg_event).collect();
    for event in &events[..4] {
        tx.try_publish(event.clone()).expect("fits");
    }
    let err = tx
        .try_publish(events[4].clone())
        .expect_err("fifth event must be refused");
    assert!(matches!(err, BfpError::ChannelFull { channel: "storage" }));
    assert_eq!(tx.dropped_count(), 1);
    drop(tx);

    let stage = StorageStage::new(
        Box::new(DirVolume::new(dir.path())),
        Box::new(BincodeCodec),
        bench_identity(),
        rx,
        terminate_rx,
        Duration::from_secs(3600),
        ".binpb",
    );
    let report = stage.run().await.expect("storage run");
    assert_eq!(report.records_written, 4);

    let written = decode_log(&dir.path().join("00000001/00000000.binpb"));
    assert_eq!(written, events[..4]);
}

#[tokio::test]
async fn sessions_number_consecutively_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");

    for expected_session in 1..=2u32 {
        let (tx, rx) = event_channel("storage", 4).expect("valid channel");
        let (_terminate_tx, terminate_rx) = oneshot::channel();
        tx.try_publish(exg_event(0)).expect("publish");
        drop(tx);

        let stage = StorageStage::new(
            Box::new(DirVolume::new(dir.path())),
            Box::new(BincodeCodec),
            bench_identity(),
            rx,
            terminate_rx,
            Duration::from_secs(3600),
            ".binpb",
        );
        let report = stage.run().await.expect("storage run");
        assert_eq!(report.session, expected_session);
    }

    assert!(dir.path().join("00000001/00000000.binpb").is_file());
    assert!(dir.path().join("00000002/00000000.binpb").is_file());
}
