//! CLI Entry Point for bfp-logger
//!
//! Provides command-line interface for:
//! - Running the recording pipeline against the mock front-end
//! - Inspecting recorded log files on the host
//!
//! # Usage
//!
//! Record for thirty seconds into ./data:
//! ```bash
//! bfp-logger run --duration 30
//! ```
//!
//! Decode a recorded log file:
//! ```bash
//! bfp-logger inspect data/00000001/00000000.binpb
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use bfp_logger::acquisition::mock::MockExgBus;
use bfp_logger::codec::{BincodeCodec, EventCodec};
use bfp_logger::config::Settings;
use bfp_logger::event::{AuxSource, Event, EventPayload};
use bfp_logger::pipeline::PipelineBuilder;
use bfp_logger::sensors::MockAuxSensor;
use bfp_logger::storage::framing::RecordReader;

#[derive(Parser)]
#[command(name = "bfp-logger")]
#[command(about = "Wearable biopotential logger core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record with the mock front-end for a fixed duration
    Run {
        /// Recording length in seconds
        #[arg(long, default_value = "10")]
        duration: u64,

        /// Config name under config/ (without extension)
        #[arg(long)]
        config: Option<String>,

        /// Volume root, overriding the configured mount root
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Decode and print the records of a log file
    Inspect {
        /// Path to a .binpb log file
        file: PathBuf,

        /// Print at most this many records
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("🫀 bfp-logger - Wearable Biopotential Logger");
    println!();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            duration,
            config,
            data_dir,
        } => run_recorder(duration, config, data_dir).await,
        Commands::Inspect { file, limit } => inspect_file(file, limit).await,
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_recorder(
    duration_secs: u64,
    config: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let mut settings = match Settings::new(config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            println!("⚙️  No loadable config ({err}), using built-in defaults");
            Settings::default()
        }
    };
    if let Some(dir) = data_dir {
        settings.storage.mount_root = dir;
    }
    init_tracing(&settings.log_level);

    let rate = settings.acquisition.sample_rate_sps;
    println!("🔧 Mock EXG front-end at {rate} SPS");
    println!("💾 Volume root: {}", settings.storage.mount_root.display());
    println!();

    let mut handle = PipelineBuilder::new(settings)
        .exg_bus(Box::new(MockExgBus::new()))
        .aux_sensor(
            Box::new(MockAuxSensor::new(AuxSource::Pressure, 101_325, 7)),
            Duration::from_secs(1),
        )
        .aux_sensor(
            Box::new(MockAuxSensor::new(AuxSource::Temperature, 3_120, 3)),
            Duration::from_secs(2),
        )
        .aux_sensor(
            Box::new(MockAuxSensor::new(AuxSource::AmbientLight, 12_000, 250)),
            Duration::from_secs(1),
        )
        .aux_sensor(
            Box::new(MockAuxSensor::new(AuxSource::Battery, 4_150, -1)),
            Duration::from_secs(5),
        )
        .launch()
        .await?;
    handle.start().await?;

    // No hardware data-ready pin on the host; a timer stands in for it.
    let drdy = handle.trigger();
    let tick = Duration::from_micros(1_000_000 / u64::from(rate));
    let driver = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            drdy.raise();
        }
    });

    println!("▶️  Recording for {duration_secs}s - Ctrl+C stops early");
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(duration_secs)) => {}
        _ = tokio::signal::ctrl_c() => println!("\n⏹  Interrupted"),
    }

    driver.abort();
    handle.stop().await?;
    let report = handle.shutdown().await?;

    println!();
    println!("✅ Recording complete");
    println!("   Session:    {:08}", report.storage.session);
    println!(
        "   Frames:     {} acquired, {} malformed, {} triggers ignored",
        report.acquisition.frames,
        report.acquisition.malformed_frames,
        report.acquisition.triggers_ignored
    );
    println!("   Aux:        {} readings", report.aux_published);
    println!(
        "   Records:    {} written, {} bytes",
        report.storage.records_written, report.storage.bytes_written
    );
    println!(
        "   Rotations:  {} ({} failed)",
        report.storage.rotations, report.storage.rotate_failures
    );
    println!(
        "   Drops:      pool {}, ingest {}, storage {}, fileless {}",
        report.acquisition.pool_exhausted,
        report.acquisition.channel_drops,
        report.processing.dropped,
        report.storage.dropped_no_file
    );
    Ok(())
}

async fn inspect_file(path: PathBuf, limit: Option<usize>) -> Result<()> {
    println!("🔍 Inspecting {}", path.display());
    println!();

    let data = tokio::fs::read(&path).await?;
    let mut reader = RecordReader::new(&data)?;
    let codec = BincodeCodec;

    let mut total = 0usize;
    let mut shown = 0usize;
    while let Some(record) = reader.next() {
        total += 1;
        if limit.is_none_or(|cap| shown < cap) {
            match codec.decode(record) {
                Ok(event) => println!("   #{total:06} {}", describe(&event)),
                Err(err) => println!("   #{total:06} undecodable record: {err}"),
            }
            shown += 1;
        }
    }
    if total > shown {
        println!("   … {} more", total - shown);
    }

    println!();
    println!("📊 {total} records");
    if reader.is_truncated() {
        println!(
            "⚠️  Truncated tail: {} bytes of a torn record",
            reader.remainder().len()
        );
    }
    Ok(())
}

fn describe(event: &Event) -> String {
    let t = event.timestamp_us as f64 / 1e6;
    match &event.payload {
        EventPayload::Exg(sample) => format!(
            "t=+{t:.6}s  exg seq={} ch0={}",
            sample.sequence,
            sample.channel_value(0).unwrap_or(0)
        ),
        EventPayload::Aux(reading) => {
            format!("t=+{t:.6}s  aux {:?} raw={}", reading.source, reading.raw)
        }
        EventPayload::None => format!("t=+{t:.6}s  {:?}", event.event_type),
    }
}
