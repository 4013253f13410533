use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
#[cfg(feature = "fault-injection")]
use std::sync::atomic::{AtomicU32, Ordering};

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tel_types::{ChainState, LedgerEntry};
use tracing::{debug, error, info, warn};

use crate::error::{poisoned, StoreError, StoreResult};
use crate::traits::{check_append, check_range, tail_of, LedgerStore};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Flush strategy for the segment file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append. An acknowledged append survives power loss.
    #[default]
    EveryWrite,
    /// Rely on OS page-cache buffering.
    OsDefault,
}

/// A record that was present on disk but could not be loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub offset: u64,
    pub reason: String,
}

/// What happened while loading the segment file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub records_loaded: usize,
    pub skipped: Vec<SkippedRecord>,
    /// Bytes of an incomplete trailing record that were cut off.
    pub truncated_bytes: u64,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.truncated_bytes == 0
    }
}

/// Frame one entry for the segment file.
///
/// On-disk format:
/// ```text
/// [4 bytes: record length (little-endian u32)]
/// [4 bytes: CRC32 of record (little-endian u32)]
/// [N bytes: record (JSON-serialized LedgerEntry)]
/// ```
pub fn encode_record(entry: &LedgerEntry) -> StoreResult<Vec<u8>> {
    let record =
        serde_json::to_vec(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(record.len())
        .map_err(|_| StoreError::Serialization(format!("record of {} bytes", record.len())))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + record.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&record).to_le_bytes());
    frame.extend_from_slice(&record);
    Ok(frame)
}

struct Segment {
    file: File,
    /// End of the last fully written record.
    offset: u64,
    entries: BTreeMap<u64, LedgerEntry>,
    /// Set when a failed write could not be rolled back.
    poisoned: bool,
}

/// Ledger store backed by a single append-only segment file.
///
/// The whole segment is loaded into memory on open and kept there as a
/// read index. Appends write a framed record, sync according to
/// [`SyncMode`], and only then publish the entry to readers.
///
/// The segment is held under an exclusive advisory lock for the lifetime
/// of the store. A second handle, in this process or another, fails to
/// open with [`StoreError::Unavailable`] instead of appending from a stale
/// in-memory tail.
///
/// On open, an incomplete trailing record (a torn write from a crash) is
/// truncated away. Records whose checksum or decoding fails are skipped and
/// listed in the [`RecoveryReport`]; the ledger verifier will then see
/// the hole as a sequence gap. A damaged header anywhere else fails the
/// open with [`StoreError::Corrupt`] and leaves the file untouched.
pub struct FileLedgerStore {
    path: PathBuf,
    sync: SyncMode,
    segment: RwLock<Segment>,
    report: RecoveryReport,
    #[cfg(feature = "fault-injection")]
    failing_writes: AtomicU32,
}

impl FileLedgerStore {
    /// Open (or create) the segment file at `path` and replay it.
    pub fn open(path: impl AsRef<Path>, sync: SyncMode) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(StoreError::Unavailable(format!(
                    "segment {} is held by another writer",
                    path.display()
                )));
            }
            Err(TryLockError::Error(e)) => return Err(StoreError::Io(e)),
        }

        let bytes = fs::read(path)?;
        let (entries, report, valid_len) = replay(&bytes)?;

        if valid_len < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                valid_len,
                truncated = report.truncated_bytes,
                "truncating torn record at end of segment"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        info!(
            path = %path.display(),
            records = report.records_loaded,
            skipped = report.skipped.len(),
            "opened ledger segment"
        );

        Ok(Self {
            path: path.to_path_buf(),
            sync,
            segment: RwLock::new(Segment {
                file,
                offset: valid_len,
                entries,
                poisoned: false,
            }),
            report,
            #[cfg(feature = "fault-injection")]
            failing_writes: AtomicU32::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Outcome of the replay performed by [`FileLedgerStore::open`].
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.report
    }

    /// Make the next `count` appends write half a record and then fail.
    #[cfg(feature = "fault-injection")]
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn write_frame(&self, file: &mut File, frame: &[u8]) -> std::io::Result<()> {
        #[cfg(feature = "fault-injection")]
        {
            let hit = self
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if hit {
                file.write_all(&frame[..frame.len() / 2])?;
                return Err(std::io::Error::other("injected write failure"));
            }
        }

        file.write_all(frame)?;
        match self.sync {
            SyncMode::EveryWrite => file.sync_data(),
            SyncMode::OsDefault => file.flush(),
        }
    }
}

impl LedgerStore for FileLedgerStore {
    fn append_if_next(&self, entry: &LedgerEntry, expected_sequence: u64) -> StoreResult<()> {
        let mut guard = self.segment.write().map_err(|_| poisoned("segment"))?;
        let segment = &mut *guard;
        if segment.poisoned {
            return Err(StoreError::Unavailable(format!(
                "segment {} is in an unknown state after a failed write",
                self.path.display()
            )));
        }

        check_append(entry, expected_sequence, tail_of(segment.entries.last_key_value()))?;
        let frame = encode_record(entry)?;

        if let Err(e) = self.write_frame(&mut segment.file, &frame) {
            // Cut the partial record back off so the file stays replayable.
            if let Err(rollback) = segment.file.set_len(segment.offset) {
                error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "rollback after failed write failed; refusing further appends"
                );
                segment.poisoned = true;
            }
            warn!(sequence = expected_sequence, error = %e, "ledger append failed");
            return Err(StoreError::Io(e));
        }

        segment.offset += frame.len() as u64;
        segment.entries.insert(expected_sequence, entry.clone());
        debug!(sequence = expected_sequence, len = frame.len(), "segment append");
        Ok(())
    }

    fn get_entry(&self, sequence: u64) -> StoreResult<Option<LedgerEntry>> {
        let segment = self.segment.read().map_err(|_| poisoned("segment"))?;
        Ok(segment.entries.get(&sequence).cloned())
    }

    fn read_page(
        &self,
        start: u64,
        end: u64,
        limit: usize,
    ) -> StoreResult<Vec<(u64, LedgerEntry)>> {
        check_range(start, end)?;
        let segment = self.segment.read().map_err(|_| poisoned("segment"))?;
        Ok(segment
            .entries
            .range(start..end)
            .take(limit)
            .map(|(k, e)| (*k, e.clone()))
            .collect())
    }

    fn get_latest(&self) -> StoreResult<Option<LedgerEntry>> {
        let segment = self.segment.read().map_err(|_| poisoned("segment"))?;
        Ok(segment.entries.values().next_back().cloned())
    }

    fn get_tail(&self) -> StoreResult<Option<ChainState>> {
        let segment = self.segment.read().map_err(|_| poisoned("segment"))?;
        Ok(tail_of(segment.entries.last_key_value()))
    }

    fn entry_count(&self) -> StoreResult<u64> {
        let segment = self.segment.read().map_err(|_| poisoned("segment"))?;
        Ok(segment.entries.len() as u64)
    }
}

impl std::fmt::Debug for FileLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLedgerStore")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

/// Decode every record in `bytes`.
///
/// Returns the loaded entries, the report, and the length of the valid
/// prefix (everything before a torn trailing record). A record that runs
/// past the end of the file only counts as torn when its bytes are an
/// unfinished JSON object; otherwise the header itself is damaged and
/// cutting the file there would discard every record behind it.
fn replay(bytes: &[u8]) -> StoreResult<(BTreeMap<u64, LedgerEntry>, RecoveryReport, u64)> {
    let mut entries = BTreeMap::new();
    let mut report = RecoveryReport::default();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_SIZE {
            report.truncated_bytes = rest.len() as u64;
            break;
        }

        let length = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let expected_crc = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);

        if length == 0 {
            return Err(StoreError::Corrupt {
                offset: offset as u64,
                reason: "zero-length record header".into(),
            });
        }
        if rest.len() - HEADER_SIZE < length {
            if !is_torn_record(&rest[HEADER_SIZE..]) {
                return Err(StoreError::Corrupt {
                    offset: offset as u64,
                    reason: format!(
                        "record length {length} runs past the end of the segment \
                         ({} bytes left) and the bytes are not an interrupted record",
                        rest.len() - HEADER_SIZE
                    ),
                });
            }
            report.truncated_bytes = rest.len() as u64;
            break;
        }

        let record = &rest[HEADER_SIZE..HEADER_SIZE + length];
        let at = offset as u64;
        offset += HEADER_SIZE + length;

        let actual_crc = crc32fast::hash(record);
        if actual_crc != expected_crc {
            warn!(
                offset = at,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping record"
            );
            report.skipped.push(SkippedRecord {
                offset: at,
                reason: format!("crc mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"),
            });
            continue;
        }

        let entry: LedgerEntry = match serde_json::from_slice(record) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(offset = at, error = %e, "failed to decode record; skipping");
                report.skipped.push(SkippedRecord {
                    offset: at,
                    reason: format!("decode failed: {e}"),
                });
                continue;
            }
        };

        let sequence = entry.sequence_number;
        if entries.contains_key(&sequence) {
            warn!(offset = at, sequence, "duplicate sequence number; keeping first record");
            report.skipped.push(SkippedRecord {
                offset: at,
                reason: format!("duplicate sequence {sequence}"),
            });
            continue;
        }
        entries.insert(sequence, entry);
        report.records_loaded += 1;
    }

    let valid_len = (bytes.len() as u64) - report.truncated_bytes;
    Ok((entries, report, valid_len))
}

/// Whether `partial` can be the beginning of a record whose write was cut
/// short: nothing yet, or a JSON object that ends before it is closed.
fn is_torn_record(partial: &[u8]) -> bool {
    match partial.first() {
        None => true,
        Some(b'{') => matches!(
            serde_json::from_slice::<IgnoredAny>(partial),
            Err(e) if e.is_eof()
        ),
        Some(_) => false,
    }
}
