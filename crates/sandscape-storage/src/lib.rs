//! File-backed snapshot persistence for Sandscape.
//!
//! A snapshot file is the magic `SNDSCAPE`, a little-endian `u32` header
//! length, the JSON-encoded [`SnapshotMeta`], then the head and tail buffers
//! as little-endian `u32` words in row-major order. Older files are upgraded
//! by [`FormatMigration`]s before the core ever sees them.

use sandscape_core::{Cell, FORMAT_VERSION, GridError, Snapshot, SnapshotMeta, SnapshotSink};
use serde_json::Value;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, mpsc},
    thread,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Leading bytes of every snapshot file.
pub const MAGIC: &[u8; 8] = b"SNDSCAPE";

const HEADER_LEN_BYTES: usize = 4;
const WORD_BYTES: usize = 4;
const FILE_PREFIX: &str = "snapshot-";
const FILE_EXTENSION: &str = "sand";
const DEFAULT_KEEP: usize = 8;

/// Storage error wrapper.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot header is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not a snapshot file (bad magic)")]
    BadMagic,
    #[error("snapshot header is malformed: {0}")]
    BadHeader(&'static str),
    #[error("snapshot format version {found} is not supported (current {current})")]
    UnsupportedVersion { found: u64, current: u16 },
    #[error("snapshot body holds {found} bytes, expected {expected}")]
    Truncated { expected: usize, found: usize },
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("storage worker error: {0}")]
    Worker(String),
}

/// Append `words` to `out` as little-endian bytes.
pub fn encode_words(words: &[u32], out: &mut Vec<u8>) {
    out.reserve(words.len() * WORD_BYTES);
    for word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
}

/// Decode a little-endian word buffer; trailing partial words are rejected.
pub fn decode_words(bytes: &[u8]) -> Result<Vec<u32>, StorageError> {
    if bytes.len() % WORD_BYTES != 0 {
        return Err(StorageError::Truncated {
            expected: bytes.len().next_multiple_of(WORD_BYTES),
            found: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(WORD_BYTES)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Serialize a snapshot into the file container.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, StorageError> {
    let header = serde_json::to_vec(&snapshot.meta)?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| StorageError::BadHeader("header exceeds u32::MAX bytes"))?;
    let cells = snapshot.heads.len();
    let mut out =
        Vec::with_capacity(MAGIC.len() + HEADER_LEN_BYTES + header.len() + cells * 2 * WORD_BYTES);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header);
    encode_words(&snapshot.heads, &mut out);
    encode_words(&snapshot.tails, &mut out);
    Ok(out)
}

/// Write `snapshot` to `path` through a temporary file so readers never see a
/// half-written snapshot.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StorageError> {
    let bytes = encode_snapshot(snapshot)?;
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Decode a current-format or migratable snapshot.
pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot, StorageError> {
    SnapshotLoader::new().decode(bytes)
}

/// Load a snapshot file with no migrations registered.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, StorageError> {
    SnapshotLoader::new().load(path)
}

/// A snapshot as read from disk, before the header is bound to the current
/// [`SnapshotMeta`] layout. Migrations rewrite this form.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    pub header: Value,
    pub heads: Vec<u32>,
    pub tails: Vec<u32>,
}

impl RawSnapshot {
    /// Split the container into header and buffers. Only `width` and `height`
    /// are read from the header here; every version must carry them.
    pub fn parse(bytes: &[u8]) -> Result<Self, StorageError> {
        let Some(rest) = bytes.strip_prefix(MAGIC.as_slice()) else {
            return Err(StorageError::BadMagic);
        };
        let Some((len_bytes, rest)) = rest.split_first_chunk::<HEADER_LEN_BYTES>() else {
            return Err(StorageError::Truncated {
                expected: HEADER_LEN_BYTES,
                found: rest.len(),
            });
        };
        let header_len = u32::from_le_bytes(*len_bytes) as usize;
        if rest.len() < header_len {
            return Err(StorageError::Truncated {
                expected: header_len,
                found: rest.len(),
            });
        }
        let (header_bytes, body) = rest.split_at(header_len);
        let header: Value = serde_json::from_slice(header_bytes)?;

        let width = header_u64(&header, "width")?;
        let height = header_u64(&header, "height")?;
        let cells = usize::try_from(width)
            .ok()
            .zip(usize::try_from(height).ok())
            .and_then(|(w, h)| w.checked_mul(h))
            .ok_or(StorageError::BadHeader("grid dimensions overflow"))?;
        let expected = cells
            .checked_mul(2 * WORD_BYTES)
            .ok_or(StorageError::BadHeader("grid dimensions overflow"))?;
        if body.len() != expected {
            return Err(StorageError::Truncated {
                expected,
                found: body.len(),
            });
        }
        let (heads, tails) = body.split_at(cells * WORD_BYTES);
        Ok(Self {
            header,
            heads: decode_words(heads)?,
            tails: decode_words(tails)?,
        })
    }

    /// Version recorded in the header.
    pub fn version(&self) -> Result<u64, StorageError> {
        header_u64(&self.header, "format_version")
    }

    /// Bind the header to the current layout and check every cell.
    pub fn into_snapshot(self) -> Result<Snapshot, StorageError> {
        let meta: SnapshotMeta = serde_json::from_value(self.header)?;
        let expected = (meta.width as usize) * (meta.height as usize);
        for (buffer, words) in [("heads", &self.heads), ("tails", &self.tails)] {
            if words.len() != expected {
                return Err(GridError::BufferLength {
                    buffer,
                    expected,
                    actual: words.len(),
                }
                .into());
            }
        }
        for (index, (&head, &tail)) in self.heads.iter().zip(&self.tails).enumerate() {
            Cell::new(head, tail)
                .validate()
                .map_err(|source| GridError::CorruptCell { index, source })?;
        }
        Ok(Snapshot {
            meta,
            heads: self.heads,
            tails: self.tails,
        })
    }
}

fn header_u64(header: &Value, field: &'static str) -> Result<u64, StorageError> {
    header
        .get(field)
        .and_then(Value::as_u64)
        .ok_or(StorageError::BadHeader(field))
}

/// Upgrades a raw snapshot from `from_version()` to the next version.
pub trait FormatMigration: Send + Sync {
    fn from_version(&self) -> u16;
    fn migrate(&self, raw: RawSnapshot) -> Result<RawSnapshot, StorageError>;
}

/// Reads snapshot files, stepping old formats forward one version at a time.
#[derive(Default)]
pub struct SnapshotLoader {
    migrations: Vec<Box<dyn FormatMigration>>,
}

impl std::fmt::Debug for SnapshotLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let versions: Vec<u16> = self.migrations.iter().map(|m| m.from_version()).collect();
        f.debug_struct("SnapshotLoader")
            .field("migrations", &versions)
            .finish()
    }
}

impl SnapshotLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration; a later registration for the same source
    /// version replaces the earlier one.
    #[must_use]
    pub fn with_migration(mut self, migration: Box<dyn FormatMigration>) -> Self {
        let version = migration.from_version();
        self.migrations.retain(|m| m.from_version() != version);
        self.migrations.push(migration);
        self
    }

    pub fn load(&self, path: &Path) -> Result<Snapshot, StorageError> {
        let bytes = fs::read(path)?;
        self.decode(&bytes)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Snapshot, StorageError> {
        let raw = RawSnapshot::parse(bytes)?;
        self.upgrade(raw)?.into_snapshot()
    }

    /// Apply migrations until the raw snapshot reaches [`FORMAT_VERSION`].
    pub fn upgrade(&self, mut raw: RawSnapshot) -> Result<RawSnapshot, StorageError> {
        let current = u64::from(FORMAT_VERSION);
        loop {
            let version = raw.version()?;
            if version == current {
                return Ok(raw);
            }
            let unsupported = StorageError::UnsupportedVersion {
                found: version,
                current: FORMAT_VERSION,
            };
            if version > current {
                return Err(unsupported);
            }
            let Some(migration) = self
                .migrations
                .iter()
                .find(|m| u64::from(m.from_version()) == version)
            else {
                return Err(unsupported);
            };
            raw = migration.migrate(raw)?;
            if let Some(object) = raw.header.as_object_mut() {
                object.insert("format_version".into(), Value::from(version + 1));
            } else {
                return Err(StorageError::BadHeader("header is not an object"));
            }
            debug!(from = version, to = version + 1, "snapshot migrated");
        }
    }
}

/// Directory of `snapshot-<tick>.sand` files, pruned to the newest `keep`.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    keep: usize,
    written: u64,
}

impl SnapshotStore {
    /// Open (creating if needed) a snapshot directory with the default retention.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::with_keep(dir, DEFAULT_KEEP)
    }

    /// Open a snapshot directory that retains at most `keep` files (minimum 1).
    pub fn with_keep(dir: impl Into<PathBuf>, keep: usize) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            keep: keep.max(1),
            written: 0,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshots written through this handle.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    #[must_use]
    pub fn path_for(&self, tick: u64) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{tick}.{FILE_EXTENSION}"))
    }

    /// Persist a snapshot and prune old files.
    pub fn write(&mut self, snapshot: &Snapshot) -> Result<PathBuf, StorageError> {
        let path = self.path_for(snapshot.meta.tick);
        save_snapshot(&path, snapshot)?;
        self.written += 1;
        self.prune()?;
        Ok(path)
    }

    /// Every snapshot file in the directory as `(tick, path)`, oldest first.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, StorageError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            let tick = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.strip_prefix(FILE_PREFIX))
                .and_then(|tick| tick.parse::<u64>().ok());
            if let Some(tick) = tick {
                entries.push((tick, path));
            }
        }
        entries.sort_by_key(|(tick, _)| *tick);
        Ok(entries)
    }

    /// Newest snapshot path, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>, StorageError> {
        Ok(self.list()?.pop().map(|(_, path)| path))
    }

    /// Load the newest snapshot through `loader`.
    pub fn load_latest(&self, loader: &SnapshotLoader) -> Result<Option<Snapshot>, StorageError> {
        self.latest()?
            .map(|path| loader.load(&path))
            .transpose()
    }

    fn prune(&self) -> Result<(), StorageError> {
        let entries = self.list()?;
        let excess = entries.len().saturating_sub(self.keep);
        for (tick, path) in entries.into_iter().take(excess) {
            fs::remove_file(&path)?;
            debug!(tick, "pruned snapshot");
        }
        Ok(())
    }
}

#[derive(Debug)]
enum StorageCommand {
    Persist(Box<Snapshot>),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Background writer that implements the core snapshot sink. Snapshots are
/// handed to a worker thread so the tick loop never blocks on disk.
pub struct SnapshotPipeline {
    tx: mpsc::Sender<StorageCommand>,
    store: Arc<Mutex<SnapshotStore>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for SnapshotPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotPipeline")
            .field("running", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl SnapshotPipeline {
    /// Spawn a pipeline writing into `dir`, keeping the newest `keep` files.
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Result<Self, StorageError> {
        Self::from_store(SnapshotStore::with_keep(dir, keep)?)
    }

    pub fn from_store(store: SnapshotStore) -> Result<Self, StorageError> {
        info!(dir = %store.dir().display(), keep = store.keep, "snapshot pipeline started");
        let shared = Arc::new(Mutex::new(store));
        let (tx, rx) = mpsc::channel::<StorageCommand>();
        let worker_store = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("sandscape-snapshot-worker".into())
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    match command {
                        StorageCommand::Persist(snapshot) => {
                            let mut store = match worker_store.lock() {
                                Ok(store) => store,
                                Err(poisoned) => {
                                    warn!(
                                        tick = snapshot.meta.tick,
                                        "snapshot store mutex poisoned; continuing"
                                    );
                                    poisoned.into_inner()
                                }
                            };
                            match store.write(&snapshot) {
                                Ok(path) => {
                                    debug!(tick = snapshot.meta.tick, path = %path.display(), "snapshot written");
                                }
                                Err(err) => {
                                    error!(tick = snapshot.meta.tick, error = %err, "failed to write snapshot");
                                }
                            }
                        }
                        StorageCommand::Flush(done) => {
                            let _ = done.send(());
                        }
                        StorageCommand::Shutdown => break,
                    }
                }
            })
            .map_err(|err| {
                StorageError::Worker(format!("failed to spawn snapshot worker thread: {err}"))
            })?;

        Ok(Self {
            tx,
            store: shared,
            handle: Some(handle),
        })
    }

    /// Shared access to the underlying store for listing and loading.
    #[must_use]
    pub fn store(&self) -> Arc<Mutex<SnapshotStore>> {
        Arc::clone(&self.store)
    }

    /// Block until every snapshot queued so far has been written.
    pub fn flush(&self) -> Result<(), StorageError> {
        let (done_tx, done_rx) = mpsc::channel();
        self.tx
            .send(StorageCommand::Flush(done_tx))
            .map_err(|_| StorageError::Worker("snapshot worker channel closed".into()))?;
        done_rx
            .recv()
            .map_err(|_| StorageError::Worker("snapshot worker exited before flushing".into()))
    }
}

impl SnapshotSink for SnapshotPipeline {
    fn on_snapshot(&mut self, snapshot: &Snapshot) {
        if self
            .tx
            .send(StorageCommand::Persist(Box::new(snapshot.clone())))
            .is_err()
        {
            warn!(
                tick = snapshot.meta.tick,
                "snapshot worker channel closed; snapshot dropped"
            );
        }
    }
}

impl Drop for SnapshotPipeline {
    fn drop(&mut self) {
        let _ = self.tx.send(StorageCommand::Shutdown);
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.join()
        {
            error!("snapshot worker thread panicked: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandscape_core::{Element, SandboxConfig, Simulation};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}-{}-{timestamp}", std::process::id()))
    }

    fn sample_snapshot() -> Snapshot {
        let config = SandboxConfig {
            width: 12,
            height: 9,
            chunk_size: 4,
            rng_seed: Some(5),
            ..SandboxConfig::default()
        };
        let mut sim = Simulation::new(config).expect("sim");
        sim.fill_rect(0, 7, 12, 9, Element::Rock);
        sim.paint(6, 2, 2, Element::Sand);
        for _ in 0..3 {
            sim.tick().expect("tick");
        }
        sim.export_snapshot()
    }

    #[test]
    fn container_layout_is_little_endian() {
        let snapshot = sample_snapshot();
        let bytes = encode_snapshot(&snapshot).expect("encode");
        assert_eq!(&bytes[..8], MAGIC);
        let header_len = u32::from_le_bytes(bytes[8..12].try_into().expect("len")) as usize;
        let body = &bytes[12 + header_len..];
        assert_eq!(body.len(), snapshot.cell_count() * 8);
        assert_eq!(&body[..4], &snapshot.heads[0].to_le_bytes());
        assert_eq!(decode_snapshot(&bytes).expect("decode"), snapshot);
    }

    #[test]
    fn malformed_files_are_rejected() {
        let bytes = encode_snapshot(&sample_snapshot()).expect("encode");

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        assert!(matches!(
            decode_snapshot(&wrong_magic),
            Err(StorageError::BadMagic)
        ));

        let short = &bytes[..bytes.len() - 4];
        assert!(matches!(
            decode_snapshot(short),
            Err(StorageError::Truncated { .. })
        ));

        assert!(matches!(
            decode_snapshot(&bytes[..10]),
            Err(StorageError::Truncated { .. })
        ));

        let mut corrupt = bytes.clone();
        let header_len = u32::from_le_bytes(bytes[8..12].try_into().expect("len")) as usize;
        // Type class 12 in the first head.
        corrupt[12 + header_len] = 0x0C;
        assert!(matches!(
            decode_snapshot(&corrupt),
            Err(StorageError::Grid(GridError::CorruptCell { index: 0, .. }))
        ));
    }

    #[test]
    fn newer_versions_are_refused() {
        let mut snapshot = sample_snapshot();
        snapshot.meta.format_version = FORMAT_VERSION + 1;
        let bytes = encode_snapshot(&snapshot).expect("encode");
        assert!(matches!(
            decode_snapshot(&bytes),
            Err(StorageError::UnsupportedVersion { found, .. }) if found == u64::from(FORMAT_VERSION) + 1
        ));
    }

    #[test]
    fn words_reject_partial_trailers() {
        let mut bytes = Vec::new();
        encode_words(&[1, 0xDEAD_BEEF], &mut bytes);
        assert_eq!(decode_words(&bytes).expect("words"), vec![1, 0xDEAD_BEEF]);
        bytes.push(0);
        assert!(decode_words(&bytes).is_err());
    }

    #[test]
    fn store_prunes_to_newest_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = temp_dir("sandscape-store");
        let mut store = SnapshotStore::with_keep(&dir, 2)?;
        let mut snapshot = sample_snapshot();
        for tick in [10, 20, 30] {
            snapshot.meta.tick = tick;
            store.write(&snapshot)?;
        }
        let ticks: Vec<u64> = store.list()?.into_iter().map(|(tick, _)| tick).collect();
        assert_eq!(ticks, vec![20, 30]);
        let latest = store.load_latest(&SnapshotLoader::new())?.expect("latest");
        assert_eq!(latest.meta.tick, 30);
        assert_eq!(store.written(), 3);
        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
