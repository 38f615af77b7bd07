//! Common utilities and types shared across cuckoo-dxl crates.

pub mod error;
pub mod timestamp;

pub use error::{Error, PublishError, Result};
pub use timestamp::{epoch_seconds, naive_epoch_seconds};
