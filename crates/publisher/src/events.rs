//! Analysis report events.
//!
//! One publish run emits up to two messages:
//!
//! 1. the full report, compact JSON, gzip-compressed, on
//!    [`ZIP_EVENT_TOPIC`], only when enabled and within the size limit;
//! 2. the curated projection, compact JSON, on [`REPORT_EVENT_TOPIC`].

use crate::bus::EventBusClient;
use crate::config::PublishOptions;
use crate::encode::{gzip_compress, to_compact_json};
use cuckoo_dxl_common::{PublishError, Result};
use cuckoo_dxl_report::{AnalysisReport, Projector};
use tracing::{debug, error, info};

/// Topic for the compressed full report.
pub const ZIP_EVENT_TOPIC: &str = "/cuckoo/event/report/zip";
/// Topic for the curated report.
pub const REPORT_EVENT_TOPIC: &str = "/cuckoo/event/report";

/// What happened to the compressed full-report event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipEventOutcome {
    /// `send_compressed_event` is off.
    Disabled,
    Published { size: usize },
    /// Compressed report exceeded the configured limit.
    SkippedTooLarge { size: usize, limit: usize },
}

/// Result of a successful publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub zip_event: ZipEventOutcome,
    /// Size of the curated report payload in bytes.
    pub report_event_size: usize,
}

/// Publish the events for one completed analysis.
///
/// The bus client must already be connected; this never connects or
/// disconnects it. Any failure is logged here and returned as a single
/// [`PublishError`].
pub fn publish(
    report: &AnalysisReport,
    options: &PublishOptions,
    bus: &dyn EventBusClient,
) -> std::result::Result<PublishOutcome, PublishError> {
    run(report, options, bus).map_err(|e| {
        error!("Error sending analysis report as an event: {} ({:?})", e, e);
        PublishError::new(e)
    })
}

fn run(
    report: &AnalysisReport,
    options: &PublishOptions,
    bus: &dyn EventBusClient,
) -> Result<PublishOutcome> {
    let zip_event = if options.send_compressed_event {
        publish_compressed(report, options, bus)?
    } else {
        ZipEventOutcome::Disabled
    };

    let projector = Projector::new(options.not_found_policy);
    let projected = projector.project(report, options.items_to_include.as_deref());
    let payload = to_compact_json(&projected)?;

    info!("Publishing analysis report on topic {}", REPORT_EVENT_TOPIC);
    bus.publish(REPORT_EVENT_TOPIC, &payload)?;

    Ok(PublishOutcome {
        zip_event,
        report_event_size: payload.len(),
    })
}

fn publish_compressed(
    report: &AnalysisReport,
    options: &PublishOptions,
    bus: &dyn EventBusClient,
) -> Result<ZipEventOutcome> {
    let json = to_compact_json(report)?;
    let compressed = gzip_compress(&json, options.compression_level)?;
    let size = compressed.len();
    let limit = options.compressed_event_max_size;
    debug!("Compressed report from {} to {} bytes", json.len(), size);

    if size > limit {
        info!(
            "Report too large ({} > {} bytes). Not publishing compressed report",
            size, limit
        );
        return Ok(ZipEventOutcome::SkippedTooLarge { size, limit });
    }

    info!("Publishing compressed report on topic {}", ZIP_EVENT_TOPIC);
    bus.publish(ZIP_EVENT_TOPIC, &compressed)?;
    Ok(ZipEventOutcome::Published { size })
}
