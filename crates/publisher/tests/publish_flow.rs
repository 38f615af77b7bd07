use cuckoo_dxl_common::{Error, Result};
use cuckoo_dxl_publisher::encode::{gzip_decompress, to_compact_json};
use cuckoo_dxl_publisher::{
    decode_event, publish, EventBusClient, MemoryBus, PublishOptions, SpoolBus, SpoolReader,
    ZipEventOutcome, REPORT_EVENT_TOPIC, ZIP_EVENT_TOPIC,
};
use cuckoo_dxl_report::{AnalysisReport, ReportValue};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn scenario_report() -> AnalysisReport {
    AnalysisReport::try_from(json!({
        "info": {"id": 1},
        "target": {"file": "x"},
        "network": {"dns": ["a"]}
    }))
    .unwrap()
}

/// Accepts `accept` publishes, then reports the broker as gone.
struct FlakyBus {
    accept: usize,
    seen: AtomicUsize,
}

impl EventBusClient for FlakyBus {
    fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn publish(&self, topic: &str, _payload: &[u8]) -> Result<()> {
        if self.seen.fetch_add(1, Ordering::SeqCst) >= self.accept {
            return Err(Error::Connection(format!("broker dropped {}", topic)));
        }
        Ok(())
    }
}

#[test]
fn test_end_to_end_two_events() {
    let bus = MemoryBus::connected();
    let options = PublishOptions {
        send_compressed_event: true,
        compressed_event_max_size: 100_000,
        items_to_include: Some("network.dns".to_string()),
        ..Default::default()
    };

    let report = scenario_report();
    let outcome = publish(&report, &options, &bus).unwrap();
    assert!(matches!(outcome.zip_event, ZipEventOutcome::Published { .. }));

    let events = bus.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].topic, ZIP_EVENT_TOPIC);
    assert_eq!(events[1].topic, REPORT_EVENT_TOPIC);

    assert_eq!(
        gzip_decompress(&events[0].payload).unwrap(),
        to_compact_json(&report).unwrap()
    );

    let curated: serde_json::Value = serde_json::from_slice(&events[1].payload).unwrap();
    assert_eq!(
        curated,
        json!({"info": {"id": 1}, "target": {"file": "x"}, "network": {"dns": ["a"]}})
    );
}

#[test]
fn test_size_gate_publishes_curated_event_only() {
    let bus = MemoryBus::connected();
    let options = PublishOptions {
        send_compressed_event: true,
        compressed_event_max_size: 10,
        ..Default::default()
    };

    publish(&scenario_report(), &options, &bus).unwrap();

    let events = bus.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic, REPORT_EVENT_TOPIC);
    assert!(bus.events_on(ZIP_EVENT_TOPIC).is_empty());
}

#[test]
fn test_datetime_in_curated_event() {
    let started = chrono::DateTime::parse_from_rfc3339("2021-01-01T00:00:30.500000+00:00").unwrap();
    let mut info = std::collections::BTreeMap::new();
    info.insert("started".to_string(), ReportValue::DateTime(started));
    let report: AnalysisReport = [("info".to_string(), ReportValue::Map(info))]
        .into_iter()
        .collect();

    let bus = MemoryBus::connected();
    publish(&report, &PublishOptions::default(), &bus).unwrap();

    let payload = String::from_utf8(bus.events()[0].payload.clone()).unwrap();
    assert_eq!(payload, r#"{"info":{"started":1609459230.5},"target":{}}"#);
}

#[test]
fn test_failure_after_zip_event_is_single_error() {
    let bus = FlakyBus {
        accept: 1,
        seen: AtomicUsize::new(0),
    };
    let options = PublishOptions {
        send_compressed_event: true,
        ..Default::default()
    };

    let err = publish(&scenario_report(), &options, &bus).unwrap_err();
    assert!(matches!(err.cause(), Error::Connection(_)));
    assert_eq!(bus.seen.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_publishes_share_one_client() {
    let bus = Arc::new(MemoryBus::connected());
    let options = Arc::new(PublishOptions {
        items_to_include: Some("network".to_string()),
        ..Default::default()
    });

    let handles: Vec<_> = (0..8)
        .map(|id| {
            let bus = Arc::clone(&bus);
            let options = Arc::clone(&options);
            std::thread::spawn(move || {
                let report = AnalysisReport::try_from(json!({
                    "info": {"id": id},
                    "network": {"hosts": [format!("10.0.0.{}", id)]}
                }))
                .unwrap();
                publish(&report, &options, bus.as_ref()).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut ids: Vec<i64> = bus
        .events_on(REPORT_EVENT_TOPIC)
        .iter()
        .map(|e| {
            let doc = decode_event(REPORT_EVENT_TOPIC, &e.payload).unwrap();
            assert_eq!(doc["network"]["hosts"].as_array().unwrap().len(), 1);
            doc["info"]["id"].as_i64().unwrap()
        })
        .collect();
    ids.sort();
    assert_eq!(ids, (0..8).collect::<Vec<i64>>());
}

#[test]
fn test_spool_round_trip_through_decoder() {
    let dir = tempfile::tempdir().unwrap();
    let bus = SpoolBus::new(dir.path().join("spool"));
    bus.connect().unwrap();

    let options = PublishOptions {
        send_compressed_event: true,
        items_to_include: Some("network.dns".to_string()),
        ..Default::default()
    };
    publish(&scenario_report(), &options, &bus).unwrap();

    let reader = SpoolReader::new(bus.root());
    let zipped = reader.messages(ZIP_EVENT_TOPIC).unwrap();
    let curated = reader.messages(REPORT_EVENT_TOPIC).unwrap();
    assert_eq!(zipped.len(), 1);
    assert_eq!(curated.len(), 1);

    let full = decode_event(ZIP_EVENT_TOPIC, &reader.read(&zipped[0]).unwrap()).unwrap();
    assert_eq!(full["network"]["dns"], json!(["a"]));

    let projected = decode_event(REPORT_EVENT_TOPIC, &reader.read(&curated[0]).unwrap()).unwrap();
    assert_eq!(projected["target"], json!({"file": "x"}));
}
