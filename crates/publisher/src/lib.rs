//! Cuckoo DXL Publisher - Send analysis reports as events on a pub/sub fabric.

pub mod bus;
pub mod config;
pub mod decode;
pub mod encode;
pub mod events;
pub mod spool;

pub use bus::{EventBusClient, MemoryBus, PublishedEvent};
pub use config::{
    ConfigurationSource, OptionValue, PublishOptions, ReportingConfig, YamlConfigSource,
};
pub use decode::{decode_event, render_event};
pub use events::{publish, PublishOutcome, ZipEventOutcome, REPORT_EVENT_TOPIC, ZIP_EVENT_TOPIC};
pub use spool::{SpoolBus, SpoolClientConfig, SpoolReader};
