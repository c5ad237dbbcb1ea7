use super::record::MeasurementRecord;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Entries kept by default before the oldest is evicted.
pub const DEFAULT_HISTORY_CAPACITY: usize = 6;
const ENTRY_PREFIX: &str = "meas_";

/// Named byte records in one flat namespace.
pub trait Storage: Send {
    /// Persists a new record. Fails with `AlreadyExists` if `name` is taken.
    fn create(&mut self, name: &str, bytes: &[u8]) -> io::Result<()>;
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;
    fn list(&self) -> io::Result<Vec<String>>;
    fn delete(&mut self, name: &str) -> io::Result<()>;
}

/// One file per record inside a directory.
#[derive(Debug, Clone)]
pub struct DirStorage {
    dir: PathBuf,
}

impl DirStorage {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Storage for DirStorage {
    fn create(&mut self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.dir.join(name))?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.dir.join(name))
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn delete(&mut self, name: &str) -> io::Result<()> {
        fs::remove_file(self.dir.join(name))
    }
}

/// In-memory storage for simulation and tests.
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    records: BTreeMap<String, Vec<u8>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemStorage {
    fn create(&mut self, name: &str, bytes: &[u8]) -> io::Result<()> {
        if self.records.contains_key(name) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{name} already exists"),
            ));
        }
        self.records.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        self.records
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.records.keys().cloned().collect())
    }

    fn delete(&mut self, name: &str) -> io::Result<()> {
        self.records
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history entry {0} not found")]
    NotFound(String),
    #[error("history entry {name} is not a valid record")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record could not be encoded")]
    Encode(#[source] serde_json::Error),
    #[error("history storage failed")]
    Storage(#[from] io::Error),
}

pub fn entry_name(stamp: i64) -> String {
    format!("{ENTRY_PREFIX}{stamp}")
}

/// Creation time embedded in an entry name, `None` for foreign names.
pub fn entry_stamp(name: &str) -> Option<i64> {
    name.strip_prefix(ENTRY_PREFIX)?.parse().ok()
}

/// Bounded, timestamp-named record store with oldest-first eviction.
pub struct History {
    storage: Box<dyn Storage>,
    capacity: usize,
    last_stamp: Option<i64>,
}

impl History {
    pub fn new(storage: Box<dyn Storage>, capacity: usize) -> Self {
        Self {
            storage,
            capacity: capacity.max(1),
            last_stamp: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Persists `record`, then evicts the oldest entries so the store holds at
    /// most `capacity` entries. Nothing is evicted when the write fails, and a
    /// failed eviction is only logged. Returns the new entry's name.
    pub fn write(&mut self, record: &MeasurementRecord, now_secs: i64) -> Result<String, HistoryError> {
        let bytes = serde_json::to_vec(record).map_err(HistoryError::Encode)?;
        let mut stamps = self.stamps()?;
        stamps.sort_unstable();
        let stamp = match stamps.last().copied().max(self.last_stamp) {
            Some(last) if now_secs <= last => last + 1,
            _ => now_secs,
        };
        let name = entry_name(stamp);
        self.storage.create(&name, &bytes)?;
        self.last_stamp = Some(stamp);

        stamps.push(stamp);
        let excess = stamps.len().saturating_sub(self.capacity);
        for &oldest in &stamps[..excess] {
            let evicted = entry_name(oldest);
            log::debug!("evicting history entry {}", evicted);
            if let Err(err) = self.storage.delete(&evicted) {
                log::warn!("could not evict {}: {}", evicted, err);
            }
        }
        Ok(name)
    }

    pub fn read(&self, name: &str) -> Result<MeasurementRecord, HistoryError> {
        let bytes = self.storage.read(name).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => HistoryError::NotFound(name.to_string()),
            _ => HistoryError::Storage(err),
        })?;
        serde_json::from_slice(&bytes).map_err(|source| HistoryError::Parse {
            name: name.to_string(),
            source,
        })
    }

    /// Entry names in storage order.
    pub fn contents(&self) -> Result<Vec<String>, HistoryError> {
        Ok(self
            .storage
            .list()?
            .into_iter()
            .filter(|name| entry_stamp(name).is_some())
            .collect())
    }

    pub fn newest_first(&self) -> Result<Vec<String>, HistoryError> {
        let mut names = self.contents()?;
        names.sort_by_key(|name| std::cmp::Reverse(entry_stamp(name)));
        Ok(names)
    }

    pub fn len(&self) -> Result<usize, HistoryError> {
        Ok(self.contents()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, HistoryError> {
        Ok(self.len()? == 0)
    }

    /// Deletes every entry, returning how many were removed.
    pub fn clear(&mut self) -> Result<usize, HistoryError> {
        let names = self.contents()?;
        for name in &names {
            self.storage.delete(name)?;
        }
        Ok(names.len())
    }

    fn stamps(&self) -> Result<Vec<i64>, HistoryError> {
        Ok(self
            .storage
            .list()?
            .iter()
            .filter_map(|name| entry_stamp(name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: i64) -> MeasurementRecord {
        MeasurementRecord {
            id,
            timestamp: id,
            mean_hr: 70,
            mean_ppi: 857,
            rmssd: 31,
            sdnn: 44,
            sns: None,
            pns: None,
            phys_age: None,
        }
    }

    #[test]
    fn keeps_only_the_newest_entries() {
        let mut history = History::new(Box::new(MemStorage::new()), 6);
        let mut written = Vec::new();
        for i in 0..10 {
            written.push(history.write(&record(i), 1_000 + i * 60).unwrap());
            assert!(history.len().unwrap() <= 6);
        }
        let contents = history.contents().unwrap();
        assert_eq!(contents.len(), 6);
        for name in &written[..4] {
            assert!(!contents.contains(name), "{name} should be evicted");
        }
        for name in &written[4..] {
            assert!(contents.contains(name));
        }
    }

    #[test]
    fn same_second_writes_get_distinct_names() {
        let mut history = History::new(Box::new(MemStorage::new()), 6);
        let a = history.write(&record(1), 500).unwrap();
        let b = history.write(&record(2), 500).unwrap();
        let c = history.write(&record(3), 499).unwrap();
        assert_eq!(a, "meas_500");
        assert_eq!(b, "meas_501");
        assert_eq!(c, "meas_502");
        assert_eq!(history.read(&b).unwrap().id, 2);
    }

    #[test]
    fn newest_first_orders_by_embedded_time() {
        let mut history = History::new(Box::new(MemStorage::new()), 6);
        history.write(&record(1), 999).unwrap();
        history.write(&record(2), 1_000).unwrap();
        history.write(&record(3), 10_000).unwrap();
        assert_eq!(
            history.newest_first().unwrap(),
            vec!["meas_10000", "meas_1000", "meas_999"]
        );
    }

    #[test]
    fn read_reports_missing_and_corrupt_entries() {
        let mut storage = MemStorage::new();
        storage.create("meas_7", b"{not json").unwrap();
        let history = History::new(Box::new(storage), 6);
        assert!(matches!(
            history.read("meas_1"),
            Err(HistoryError::NotFound(name)) if name == "meas_1"
        ));
        assert!(matches!(
            history.read("meas_7"),
            Err(HistoryError::Parse { .. })
        ));
    }

    #[test]
    fn foreign_names_are_ignored() {
        let mut storage = MemStorage::new();
        storage.create("notes.txt", b"hello").unwrap();
        let mut history = History::new(Box::new(storage), 2);
        history.write(&record(1), 10).unwrap();
        assert_eq!(history.contents().unwrap(), vec!["meas_10"]);
        assert_eq!(history.clear().unwrap(), 1);
        assert!(history.is_empty().unwrap());
    }

    #[test]
    fn directory_storage_round_trip() {
        let dir = tempdir().unwrap();
        let storage = DirStorage::open(dir.path().join("hist")).unwrap();
        let mut history = History::new(Box::new(storage), 6);
        for i in 0..8 {
            history.write(&record(i), 1_700_000_000 + i).unwrap();
        }
        let names = history.newest_first().unwrap();
        assert_eq!(names.len(), 6);
        assert_eq!(names[0], "meas_1700000007");
        assert_eq!(history.read(&names[0]).unwrap(), record(7));

        // A fresh handle over the same directory continues the sequence.
        let reopened = DirStorage::open(dir.path().join("hist")).unwrap();
        let mut history = History::new(Box::new(reopened), 6);
        let name = history.write(&record(99), 1_700_000_000).unwrap();
        assert_eq!(name, "meas_1700000008");
        assert_eq!(history.clear().unwrap(), 6);
    }

    /// Accepts reads and deletes but refuses every new record.
    struct FullStorage(MemStorage);

    impl Storage for FullStorage {
        fn create(&mut self, _name: &str, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
        fn read(&self, name: &str) -> io::Result<Vec<u8>> {
            self.0.read(name)
        }
        fn list(&self) -> io::Result<Vec<String>> {
            self.0.list()
        }
        fn delete(&mut self, name: &str) -> io::Result<()> {
            self.0.delete(name)
        }
    }

    #[test]
    fn failed_write_keeps_every_entry() {
        let mut full = MemStorage::new();
        for i in 0..6 {
            full.create(&entry_name(100 + i), &serde_json::to_vec(&record(i)).unwrap())
                .unwrap();
        }
        let mut history = History::new(Box::new(FullStorage(full)), 6);
        assert!(matches!(
            history.write(&record(7), 1_000),
            Err(HistoryError::Storage(_))
        ));
        assert_eq!(history.len().unwrap(), 6);
        assert!(history.contents().unwrap().contains(&entry_name(100)));
    }

    #[test]
    fn encode_errors_do_not_read_as_corrupt_entries() {
        let source = serde_json::from_str::<i64>("x").unwrap_err();
        let err = HistoryError::Encode(source);
        assert_eq!(err.to_string(), "record could not be encoded");
        assert!(!matches!(err, HistoryError::Parse { .. }));
    }

    #[test]
    fn storage_create_refuses_existing_names() {
        let mut storage = MemStorage::new();
        storage.create("a", b"1").unwrap();
        let err = storage.create("a", b"2").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(storage.read("a").unwrap(), b"1");
    }
}
