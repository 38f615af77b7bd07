//! cuckoo-dxl - Publish Cuckoo analysis reports as events and follow them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cuckoo_dxl_publisher::config::DEFAULT_SECTION;
use cuckoo_dxl_publisher::{
    decode_event, publish, render_event, EventBusClient, PublishOptions, PublishOutcome,
    ReportingConfig, SpoolBus, SpoolReader, YamlConfigSource, ZipEventOutcome,
    REPORT_EVENT_TOPIC,
};
use cuckoo_dxl_report::{AnalysisReport, NotFoundPolicy, Projector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cuckoo-dxl")]
#[command(
    author,
    version,
    about = "Send Cuckoo analysis reports as events on a publish/subscribe fabric"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the report events for one or more completed analyses
    Publish {
        /// Reporting configuration file (YAML)
        #[arg(long)]
        config: PathBuf,

        /// Configuration section holding the reporting options
        #[arg(long, default_value = DEFAULT_SECTION)]
        section: String,

        /// Analysis report files (JSON)
        #[arg(required = true)]
        reports: Vec<PathBuf>,
    },

    /// Print the curated report that would be published
    Project {
        /// Analysis report file (JSON)
        #[arg(long)]
        report: PathBuf,

        /// Comma-separated dot paths to include
        #[arg(long)]
        items: Option<String>,

        /// Insert an empty mapping for items missing from the report
        #[arg(long)]
        insert_empty: bool,
    },

    /// Decode a received event payload
    Decode {
        /// Topic the payload was received on
        #[arg(long, default_value = REPORT_EVENT_TOPIC)]
        topic: String,

        /// Payload file
        #[arg(long)]
        payload: PathBuf,
    },

    /// Follow events arriving in a spool directory
    Subscribe {
        /// Spool directory written by the publisher
        #[arg(long)]
        spool_dir: PathBuf,

        /// Topic to follow
        #[arg(long, default_value = REPORT_EVENT_TOPIC)]
        topic: String,

        /// Polling interval in seconds
        #[arg(long, default_value = "5")]
        interval: u64,

        /// Also print events already in the spool
        #[arg(long)]
        from_start: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match cli.command {
        Commands::Publish {
            config,
            section,
            reports,
        } => publish_reports(&config, &section, reports).await?,

        Commands::Project {
            report,
            items,
            insert_empty,
        } => {
            let policy = if insert_empty {
                NotFoundPolicy::InsertEmpty
            } else {
                NotFoundPolicy::Skip
            };
            let report = read_report(&report)?;
            let projected = Projector::new(policy).project(&report, items.as_deref());
            println!("{}", serde_json::to_string_pretty(&projected)?);
        }

        Commands::Decode { topic, payload } => {
            let bytes = std::fs::read(&payload)
                .with_context(|| format!("Failed to read payload {:?}", payload))?;
            let event = decode_event(&topic, &bytes)?;
            println!("{}", render_event(&event)?);
        }

        Commands::Subscribe {
            spool_dir,
            topic,
            interval,
            from_start,
        } => follow(spool_dir, &topic, interval, from_start).await?,
    }

    Ok(())
}

async fn publish_reports(config: &Path, section: &str, reports: Vec<PathBuf>) -> Result<()> {
    let source = YamlConfigSource::load(config, section)?;
    let reporting = ReportingConfig::from_source(&source)?;

    if !reporting.enabled {
        info!("Event reporting is disabled in {:?}", config);
        return Ok(());
    }

    let bus = SpoolBus::from_config_file(&reporting.client_config_file)?;
    bus.connect()?;
    let bus: Arc<dyn EventBusClient> = Arc::new(bus);
    let options = Arc::new(reporting.publish);

    let total = reports.len();
    let mut tasks = JoinSet::new();
    for path in reports {
        let bus = Arc::clone(&bus);
        let options = Arc::clone(&options);
        tasks.spawn_blocking(move || {
            let outcome = publish_file(&path, &options, bus.as_ref());
            (path, outcome)
        });
    }

    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        let (path, outcome) = joined?;
        match outcome {
            Ok(outcome) => log_outcome(&path, &outcome),
            Err(e) => {
                error!("Failed to publish {:?}: {:#}", path, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} reports failed to publish", failed, total);
    }
    Ok(())
}

fn publish_file(
    path: &Path,
    options: &PublishOptions,
    bus: &dyn EventBusClient,
) -> Result<PublishOutcome> {
    let report = read_report(path)?;
    Ok(publish(&report, options, bus)?)
}

fn read_report(path: &Path) -> Result<AnalysisReport> {
    let content =
        std::fs::read(path).with_context(|| format!("Failed to read report {:?}", path))?;
    serde_json::from_slice(&content).with_context(|| format!("Invalid report {:?}", path))
}

fn log_outcome(path: &Path, outcome: &PublishOutcome) {
    match outcome.zip_event {
        ZipEventOutcome::Published { size } => {
            info!("{:?}: compressed report published ({} bytes)", path, size)
        }
        ZipEventOutcome::SkippedTooLarge { size, limit } => warn!(
            "{:?}: compressed report skipped ({} bytes, limit {})",
            path, size, limit
        ),
        ZipEventOutcome::Disabled => {}
    }
    info!(
        "{:?}: curated report published ({} bytes)",
        path, outcome.report_event_size
    );
}

async fn follow(spool_dir: PathBuf, topic: &str, every: u64, from_start: bool) -> Result<()> {
    let reader = SpoolReader::new(spool_dir);
    // Last message handled; message names sort in publish order.
    let mut mark: Option<PathBuf> = if from_start {
        None
    } else {
        reader.messages(topic)?.pop()
    };

    println!("Waiting for events on {} ...", topic);
    let mut ticker = interval(Duration::from_secs(every.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping subscriber");
                return Ok(());
            }
        }

        let messages = match reader.messages_after(topic, mark.as_deref()) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Failed to list messages on {}: {}", topic, e);
                continue;
            }
        };

        for message in messages {
            mark = Some(message.clone());
            let payload = match reader.read(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Skipping unreadable message {:?}: {}", message, e);
                    continue;
                }
            };
            match decode_event(topic, &payload) {
                Ok(event) => println!("Event received on {}:\n{}\n", topic, render_event(&event)?),
                Err(e) => warn!("Skipping undecodable message {:?}: {}", message, e),
            }
        }
    }
}
