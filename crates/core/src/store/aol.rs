//! Append-only log (AOL) persistence support.
//!
//! Every mutating command is appended to a plain file as one encoded array
//! frame, `[CMD, arg1, arg2, ...]`. On startup the file is replayed against
//! an empty store to reconstruct state; a torn tail from a crash mid-write
//! terminates replay silently.
//!
//! # Sync cadence
//!
//! - `Always` - flush and fsync inline after each write
//! - `EverySec` - flush inline; a background worker fsyncs about once per
//!   second (default)
//! - `No` - flush inline; fsync timing is at the OS's discretion
//!
//! # Rewrite
//!
//! A background worker serializes a point-in-time snapshot of the store as
//! minimal `SET key value [PX remaining]` commands into `<path>.tmp`, fsyncs
//! and atomically renames it onto the live path. The writer reopens the log
//! once the worker is reaped.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Result, StorageError};
use crate::resp::{parser, Encoder, Frame, FrameError};

use super::entry::now_ms;
use super::{Db, Entry};

/// Default log location, relative to the working directory.
pub const DEFAULT_AOL_PATH: &str = "appendonly.aof";

const FSYNC_INTERVAL: Duration = Duration::from_secs(1);

/// How often the durable fsync is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// fsync inline after every write
    Always,
    /// background fsync roughly every second
    EverySec,
    /// leave fsync timing to the OS
    No,
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::EverySec
    }
}

impl FromStr for SyncMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(SyncMode::Always),
            "everysec" => Ok(SyncMode::EverySec),
            "no" => Ok(SyncMode::No),
            other => Err(StorageError::InvalidType(format!(
                "unknown sync mode '{}'",
                other
            ))),
        }
    }
}

/// Background fsync worker for the `EverySec` mode.
struct FsyncWorker {
    shutdown: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl FsyncWorker {
    fn spawn(file: Arc<Mutex<File>>) -> Self {
        let (shutdown, rx) = mpsc::channel();
        let handle = thread::spawn(move || loop {
            match rx.recv_timeout(FSYNC_INTERVAL) {
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = file.lock().sync_data() {
                        warn!(error = %e, "background fsync failed");
                    }
                }
                // Shutdown requested, or the writer was dropped.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        Self { shutdown, handle }
    }

    fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.join();
    }
}

/// AOL writer: appends encoded command frames and owns the fsync cadence
/// and the background rewrite worker.
pub struct AolWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_mode: SyncMode,
    /// Handle to the same file, shared with the fsync worker thread.
    sync_handle: Arc<Mutex<File>>,
    fsync_worker: Option<FsyncWorker>,
    rewrite: Option<thread::JoinHandle<Result<()>>>,
}

impl AolWriter {
    /// Open (creating if needed) the log for append.
    pub fn open(path: impl Into<PathBuf>, sync_mode: SyncMode) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let sync_handle = Arc::new(Mutex::new(file.try_clone()?));
        let fsync_worker = match sync_mode {
            SyncMode::EverySec => Some(FsyncWorker::spawn(Arc::clone(&sync_handle))),
            _ => None,
        };

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            sync_mode,
            sync_handle,
            fsync_worker,
            rewrite: None,
        })
    }

    /// Append one pre-encoded command frame and flush it to the OS.
    pub fn append(&mut self, frame: &[u8]) -> Result<()> {
        self.writer.write_all(frame)?;
        self.writer.flush()?;
        if self.sync_mode == SyncMode::Always {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Flush the user buffer and request a durable fsync.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    pub fn rewrite_in_progress(&self) -> bool {
        self.rewrite.is_some()
    }

    /// Kick off a background rewrite from a detached snapshot of the store.
    ///
    /// Fails fast while a previous rewrite is still running.
    pub fn start_rewrite(&mut self, snapshot: BTreeMap<Vec<u8>, Entry>) -> Result<()> {
        if self.rewrite.is_some() {
            return Err(StorageError::Busy(
                "rewrite already in progress".to_string(),
            ));
        }

        let path = self.path.clone();
        info!(entries = snapshot.len(), "background append log rewrite started");
        self.rewrite = Some(thread::spawn(move || rewrite_snapshot(&path, snapshot)));
        Ok(())
    }

    /// Reap the rewrite worker without blocking. On success the live log is
    /// reopened so subsequent appends land in the rewritten file; on failure
    /// the live log is left intact.
    pub fn poll_rewrite(&mut self) {
        let Some(task) = self.rewrite.take() else {
            return;
        };
        if !task.is_finished() {
            self.rewrite = Some(task);
            return;
        }

        match task.join() {
            Ok(Ok(())) => {
                info!("background append log rewrite completed");
                if let Err(e) = self.reopen() {
                    error!(error = %e, "failed to reopen append log after rewrite");
                }
            }
            Ok(Err(e)) => error!(error = %e, "background append log rewrite failed"),
            Err(_) => error!("background append log rewrite worker panicked"),
        }
    }

    fn reopen(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        *self.sync_handle.lock() = file.try_clone()?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

impl Drop for AolWriter {
    fn drop(&mut self) {
        if let Some(worker) = self.fsync_worker.take() {
            worker.stop();
        }
        if let Err(e) = self.sync() {
            warn!(error = %e, "final append log sync failed");
        }
    }
}

/// Serialize every record of the snapshot as a minimal reconstruction
/// command into `<path>.tmp`, then atomically rename onto the live path.
fn rewrite_snapshot(path: &Path, snapshot: BTreeMap<Vec<u8>, Entry>) -> Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);

    let file = File::create(&tmp_path)?;
    let mut writer = BufWriter::new(file);
    let now = now_ms();
    let mut encoder = Encoder::with_capacity(4096);

    for (key, entry) in &snapshot {
        if entry.is_expired(now) {
            continue;
        }
        let mut items = vec![
            Frame::BulkString(Bytes::from_static(b"SET")),
            Frame::BulkString(Bytes::copy_from_slice(key)),
            Frame::BulkString(entry.value.clone()),
        ];
        if let Some(remaining) = entry.ttl_millis(now) {
            items.push(Frame::BulkString(Bytes::from_static(b"PX")));
            items.push(Frame::BulkString(Bytes::from(
                remaining.to_string().into_bytes(),
            )));
        }
        encoder.clear();
        encoder.encode(&Frame::Array(items));
        writer.write_all(encoder.as_bytes())?;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Replay the log at `path` directly against the store, bypassing the
/// dispatcher. Returns the number of applied commands.
///
/// A decode failure ends replay without propagating an error: a tail of
/// partial bytes models a crash mid-write. A missing file yields an empty
/// store.
pub fn replay(path: &Path, db: &mut Db) -> Result<usize> {
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no append log found, starting with an empty store");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let mut pos = 0;
    let mut count = 0;
    while pos < contents.len() {
        let frame = match parser::parse(&contents, &mut pos) {
            Ok(frame) => frame,
            Err(FrameError::Incomplete) => {
                warn!(offset = pos, "truncated record at end of append log");
                break;
            }
            Err(FrameError::Protocol(msg)) => {
                warn!(offset = pos, error = %msg, "corrupt record, stopping replay");
                break;
            }
        };
        if let Frame::Array(items) = frame {
            if apply_record(db, &items) {
                count += 1;
            }
        }
    }

    Ok(count)
}

/// Apply one logged command using the fixed replay shapes.
fn apply_record(db: &mut Db, items: &[Frame]) -> bool {
    let Some(name) = items.first().and_then(Frame::as_bulk) else {
        return false;
    };

    if name.eq_ignore_ascii_case(b"SET") {
        let (Some(key), Some(value)) = (bulk_arg(items, 1), bulk_arg(items, 2)) else {
            return false;
        };
        if items.len() == 3 {
            db.set(key.to_vec(), Bytes::copy_from_slice(value));
            return true;
        }
        if items.len() >= 5 {
            let (Some(opt), Some(n)) = (bulk_arg(items, 3), int_arg(items, 4)) else {
                return false;
            };
            if opt.eq_ignore_ascii_case(b"EX") {
                db.set_px(key.to_vec(), Bytes::copy_from_slice(value), n.saturating_mul(1000));
                return true;
            }
            if opt.eq_ignore_ascii_case(b"PX") {
                db.set_px(key.to_vec(), Bytes::copy_from_slice(value), n);
                return true;
            }
        }
        false
    } else if name.eq_ignore_ascii_case(b"DEL") {
        for item in &items[1..] {
            if let Some(key) = item.as_bulk() {
                db.del(key);
            }
        }
        items.len() > 1
    } else if name.eq_ignore_ascii_case(b"EXPIRE") {
        let (Some(key), Some(seconds)) = (bulk_arg(items, 1), int_arg(items, 2)) else {
            return false;
        };
        db.expire(key, seconds);
        true
    } else if name.eq_ignore_ascii_case(b"INCR") {
        let Some(key) = bulk_arg(items, 1) else {
            return false;
        };
        let key = key.to_vec();
        match db.get(&key) {
            Some(value) => {
                // Compute the increment from the replayed state; a
                // non-integer current value is skipped.
                let parsed = std::str::from_utf8(&value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .and_then(|n| n.checked_add(1));
                if let Some(next) = parsed {
                    db.set(key, Bytes::from(next.to_string().into_bytes()));
                }
            }
            None => db.set(key, Bytes::from_static(b"1")),
        }
        true
    } else {
        debug!("skipping unknown record during replay");
        false
    }
}

fn bulk_arg(items: &[Frame], index: usize) -> Option<&Bytes> {
    items.get(index).and_then(Frame::as_bulk)
}

fn int_arg(items: &[Frame], index: usize) -> Option<i64> {
    let bytes = bulk_arg(items, index)?;
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
