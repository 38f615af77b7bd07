//! Directory spool client.
//!
//! Stands in for a broker connection on a single host: every published
//! message becomes one file under `<spool_dir>/<topic>/`. Subscribers poll
//! the same directory through [`SpoolReader`].

use crate::bus::EventBusClient;
use chrono::Utc;
use cuckoo_dxl_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Extension of a completed message file.
pub const MESSAGE_EXTENSION: &str = "msg";

/// Client configuration file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolClientConfig {
    pub spool_dir: PathBuf,
}

impl SpoolClientConfig {
    /// Load the client configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "cannot read client config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: SpoolClientConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

/// Map a topic onto a directory below `root`.
fn topic_dir(root: &Path, topic: &str) -> Result<PathBuf> {
    let mut dir = root.to_path_buf();
    let mut segments = 0;
    for segment in topic.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(Error::Connection(format!("invalid topic: {}", topic)));
        }
        dir.push(segment);
        segments += 1;
    }
    if segments == 0 {
        return Err(Error::Connection(format!("invalid topic: '{}'", topic)));
    }
    Ok(dir)
}

/// Bus client writing messages into a spool directory.
#[derive(Debug)]
pub struct SpoolBus {
    root: PathBuf,
    connected: AtomicBool,
    sequence: Mutex<u64>,
}

impl SpoolBus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connected: AtomicBool::new(false),
            sequence: Mutex::new(0),
        }
    }

    /// Build a client from its configuration file.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let config = SpoolClientConfig::load(path)?;
        Ok(Self::new(config.spool_dir))
    }

    /// Spool directory this client writes to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Next message file stem. The clock is read under the same lock as the
    /// sequence number so names sort in publish order.
    fn next_message_name(&self) -> String {
        let mut sequence = self
            .sequence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let seq = *sequence;
        *sequence += 1;
        format!("{}-{:08}-{}", stamp, seq, uuid::Uuid::new_v4())
    }
}

impl EventBusClient for SpoolBus {
    fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        info!("Opening spool at {}", self.root.display());
        std::fs::create_dir_all(&self.root).map_err(|e| {
            Error::Connection(format!("cannot open spool {}: {}", self.root.display(), e))
        })?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.root.is_dir()
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Connection(format!(
                "cannot publish on {}: spool {} is not connected",
                topic,
                self.root.display()
            )));
        }

        let dir = topic_dir(&self.root, topic)?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Connection(format!("cannot create {}: {}", dir.display(), e)))?;

        let name = self.next_message_name();
        let partial = dir.join(format!("{}.tmp", name));
        let complete = dir.join(format!("{}.{}", name, MESSAGE_EXTENSION));

        // Readers only pick up `.msg` files, so the rename publishes atomically.
        std::fs::write(&partial, payload)
            .and_then(|_| std::fs::rename(&partial, &complete))
            .map_err(|e| {
                Error::Connection(format!("cannot write {}: {}", complete.display(), e))
            })?;

        debug!("Spooled {} bytes to {}", payload.len(), complete.display());
        Ok(())
    }
}

/// Read side of a spool directory.
#[derive(Debug, Clone)]
pub struct SpoolReader {
    root: PathBuf,
}

impl SpoolReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Completed messages on `topic`, oldest first.
    pub fn messages(&self, topic: &str) -> Result<Vec<PathBuf>> {
        self.messages_after(topic, None)
    }

    /// Completed messages on `topic` that sort after `mark`, oldest first.
    pub fn messages_after(&self, topic: &str, mark: Option<&Path>) -> Result<Vec<PathBuf>> {
        let dir = topic_dir(&self.root, topic)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut messages = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_message = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(MESSAGE_EXTENSION);
            let is_new = mark.map_or(true, |mark| path.as_path() > mark);
            if is_message && is_new {
                messages.push(path);
            }
        }
        messages.sort();
        Ok(messages)
    }

    /// Payload of one message file.
    pub fn read(&self, message: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_publish_then_read() {
        let dir = tempdir().unwrap();
        let bus = SpoolBus::new(dir.path().join("spool"));
        bus.connect().unwrap();
        bus.publish("/cuckoo/event/report", b"first").unwrap();
        bus.publish("/cuckoo/event/report", b"second").unwrap();
        bus.publish("/cuckoo/event/report/zip", b"zipped").unwrap();

        let reader = SpoolReader::new(bus.root());
        let messages = reader.messages("/cuckoo/event/report").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(reader.read(&messages[0]).unwrap(), b"first".to_vec());
        assert_eq!(reader.read(&messages[1]).unwrap(), b"second".to_vec());

        let zipped = reader.messages("/cuckoo/event/report/zip").unwrap();
        assert_eq!(zipped.len(), 1);
    }

    #[test]
    fn test_messages_after_mark() {
        let dir = tempdir().unwrap();
        let bus = SpoolBus::new(dir.path());
        bus.connect().unwrap();
        for payload in [b"one", b"two", b"six"] {
            bus.publish("/t", payload).unwrap();
        }

        let reader = SpoolReader::new(dir.path());
        let all = reader.messages("/t").unwrap();
        let after_first = reader.messages_after("/t", Some(&all[0])).unwrap();
        assert_eq!(after_first, all[1..].to_vec());
        assert!(reader.messages_after("/t", Some(&all[2])).unwrap().is_empty());
    }

    #[test]
    fn test_names_sort_in_publish_order_across_threads() {
        let dir = tempdir().unwrap();
        let bus = std::sync::Arc::new(SpoolBus::new(dir.path()));
        bus.connect().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        bus.publish("/t", b"x").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let messages = SpoolReader::new(dir.path()).messages("/t").unwrap();
        let sequences: Vec<u64> = messages
            .iter()
            .map(|path| {
                let name = path.file_name().unwrap().to_str().unwrap();
                name.split('-').nth(1).unwrap().parse().unwrap()
            })
            .collect();
        assert_eq!(sequences, (0..100).collect::<Vec<u64>>());
    }

    #[test]
    fn test_read_removed_message_is_an_error() {
        let dir = tempdir().unwrap();
        let bus = SpoolBus::new(dir.path());
        bus.connect().unwrap();
        bus.publish("/t", b"gone").unwrap();

        let reader = SpoolReader::new(dir.path());
        let message = reader.messages("/t").unwrap().remove(0);
        std::fs::remove_file(&message).unwrap();
        assert!(matches!(reader.read(&message), Err(Error::Io(_))));
    }

    #[test]
    fn test_publish_before_connect_fails() {
        let dir = tempdir().unwrap();
        let bus = SpoolBus::new(dir.path());
        let err = bus.publish("/t", b"x").unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_connect_is_idempotent() {
        let dir = tempdir().unwrap();
        let bus = SpoolBus::new(dir.path().join("a").join("b"));
        bus.connect().unwrap();
        bus.connect().unwrap();
        assert!(bus.is_connected());
    }

    #[test]
    fn test_rejects_escaping_topics() {
        let dir = tempdir().unwrap();
        let bus = SpoolBus::new(dir.path());
        bus.connect().unwrap();
        assert!(bus.publish("/cuckoo/../../etc", b"x").is_err());
        assert!(bus.publish("/", b"x").is_err());
    }

    #[test]
    fn test_reader_on_missing_topic() {
        let dir = tempdir().unwrap();
        let reader = SpoolReader::new(dir.path());
        assert!(reader.messages("/nothing/here").unwrap().is_empty());
    }

    #[test]
    fn test_from_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("client.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "spool_dir: {}", dir.path().join("spool").display()).unwrap();

        let bus = SpoolBus::from_config_file(&config_path).unwrap();
        assert_eq!(bus.root(), dir.path().join("spool"));
    }

    #[test]
    fn test_missing_config_file() {
        let err = SpoolBus::from_config_file(Path::new("/nonexistent/client.yaml")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
