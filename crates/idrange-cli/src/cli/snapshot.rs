use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{BufReader, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, bail};
use idrange::{MemoryStore, Snapshot, StoreConfig};

/// Loads the store saved at `path`, or an empty one if the file does not
/// exist yet.
pub fn load(path: &Path, config: StoreConfig) -> anyhow::Result<MemoryStore> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no state file, starting empty");
            return Ok(MemoryStore::new(config));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("opening {}", path.display()));
        }
    };
    let snapshot =
        read_snapshot(BufReader::new(file)).with_context(|| format!("reading {}", path.display()))?;
    MemoryStore::from_snapshot(snapshot, config)
        .with_context(|| format!("restoring {}", path.display()))
}

/// Writes the store next to `path` and renames it into place, so a crash
/// never leaves a half-written state file.
pub fn save(path: &Path, store: &MemoryStore) -> anyhow::Result<()> {
    let tmp = temp_path(path);
    {
        let mut out = BufWriter::new(
            File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?,
        );
        write_snapshot(store, &mut out)?;
        out.flush()?;
        out.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("moving {} to {}", tmp.display(), path.display()))?;
    tracing::debug!(path = %path.display(), "state saved");
    Ok(())
}

pub fn read_snapshot(reader: impl Read) -> anyhow::Result<Snapshot> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_snapshot(store: &MemoryStore, writer: impl Write) -> anyhow::Result<()> {
    let snapshot = store.snapshot()?;
    serde_json::to_writer_pretty(writer, &snapshot)?;
    Ok(())
}

/// Unique per process and call, so concurrent writers never share a temp
/// file.
fn temp_path(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    path.with_file_name(name)
}

/// `<state>.lock`, next to the state file.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive hold on a state file between processes, from before it is
/// loaded until after it is saved. Released on drop.
///
/// The lock is a sibling file created with `create_new`; a holder that
/// crashes leaves it behind and it must be removed by hand.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    _file: File,
}

impl StateLock {
    const RETRY: Duration = Duration::from_millis(10);

    /// Waits up to `timeout` for the lock on `state`.
    pub fn acquire(state: &Path, timeout: Duration) -> anyhow::Result<Self> {
        let path = lock_path(state);
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "pid={}", std::process::id());
                    tracing::debug!(lock = %path.display(), "state locked");
                    return Ok(Self { path, _file: file });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        tracing::warn!(lock = %path.display(), ?timeout, "state lock busy");
                        bail!(
                            "{} is held by another process (waited {timeout:?})",
                            path.display()
                        );
                    }
                    thread::sleep(Self::RETRY);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("creating {}", path.display()));
                }
            }
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
