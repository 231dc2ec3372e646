//! On-disk object store.
//!
//! Objects live at `<root>/<bucket>/<key>` with the caller's timestamp in an
//! 8-byte little-endian sidecar at `<root>/<bucket>/<key>.meta`. The filesystem
//! is the index. All operations are synchronous (blocking I/O); callers in async
//! context go through `spawn_blocking`.

use std::ffi::OsStr;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{debug, info};

const META_SUFFIX: &str = ".meta";
const STAGING_DIR: &str = ".staging";
const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("InvalidPath: {0}")]
    InvalidPath(String),
    #[error("NotFound: {0}")]
    NotFound(String),
    #[error("IOError: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub data: Vec<u8>,
    pub timestamp: i64,
}

/// Blob storage rooted at one directory.
///
/// One reader/writer lock covers the whole store: mutations are exclusive,
/// reads are shared, so a reader never sees a payload without its sidecar.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    fsync: bool,
    lock: RwLock<()>,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path, fsync: bool) -> Result<Self> {
        DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(root)?;
        let root = root.canonicalize()?;
        info!(root = %root.display(), fsync, "opened local store");
        Ok(Self {
            root,
            fsync,
            lock: RwLock::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` under `(bucket, key)`, replacing any previous object.
    /// The payload is written before the sidecar.
    pub fn write(&self, bucket: &str, key: &str, data: &[u8], timestamp: i64) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);

        self.create_parent(&path)?;
        self.write_file(&path, data)?;
        self.write_file(&meta_path(&path), &(timestamp as u64).to_le_bytes())?;
        debug!(bucket, key, size = data.len(), timestamp, "wrote object");
        Ok(())
    }

    /// Read an object and its timestamp. A missing or corrupt sidecar falls
    /// back to the payload's modification time in nanoseconds.
    pub fn read(&self, bucket: &str, key: &str) -> Result<Object> {
        let path = self.object_path(bucket, key)?;
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);

        let mut file = open_object(&path, bucket, key)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        let timestamp = read_timestamp(&path, &file)?;
        Ok(Object { data, timestamp })
    }

    /// Remove an object and its sidecar. A missing sidecar is not an error.
    pub fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);

        ensure_object(&path, bucket, key)?;
        fs::remove_file(&path)?;
        remove_if_exists(&meta_path(&path))?;
        debug!(bucket, key, "deleted object");
        Ok(())
    }

    /// Concatenate `parts` (keys in the same bucket) into `key`, then remove
    /// the parts. Returns the number of bytes in the assembled object.
    ///
    /// Every part is checked before anything is written. The concatenation is
    /// staged under the store root and renamed into place, so readers see
    /// either the old object or the complete new one.
    pub fn assemble(&self, bucket: &str, key: &str, parts: &[String]) -> Result<u64> {
        let target = self.object_path(bucket, key)?;
        let sources = parts
            .iter()
            .map(|part| self.object_path(bucket, part))
            .collect::<Result<Vec<_>>>()?;
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);

        for (part, path) in parts.iter().zip(&sources) {
            ensure_object(path, bucket, part)?;
        }

        let staging_dir = self.root.join(STAGING_DIR);
        DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(&staging_dir)?;
        let staged = staging_dir.join(format!("assemble-{:016x}", rand::rng().random::<u64>()));

        let size = match self
            .concat(&sources, &staged)
            .and_then(|size| self.create_parent(&target).map(|_| size))
            .and_then(|size| fs::rename(&staged, &target).map(|_| size))
        {
            Ok(size) => size,
            Err(err) => {
                let _ = fs::remove_file(&staged);
                return Err(err.into());
            }
        };
        self.write_file(&meta_path(&target), &unix_nanos().to_le_bytes())?;

        for path in sources.iter().filter(|path| **path != target) {
            remove_if_exists(path)?;
            remove_if_exists(&meta_path(path))?;
        }
        debug!(bucket, key, parts = parts.len(), size, "assembled object");
        Ok(size)
    }

    /// Resolve `(bucket, key)` to a path strictly below `<root>/<bucket>`.
    /// The key is normalised lexically; nothing touches the filesystem.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        if bucket.is_empty()
            || bucket.starts_with('.')
            || bucket.contains(['/', '\\', '\0'])
        {
            return Err(StoreError::InvalidPath(format!("bad bucket name {bucket:?}")));
        }
        if key.is_empty() || key.contains('\0') {
            return Err(StoreError::InvalidPath(format!("bad key {key:?}")));
        }

        let mut components: Vec<&OsStr> = Vec::new();
        for component in Path::new(key).components() {
            match component {
                Component::Normal(c) if c.to_string_lossy().ends_with(META_SUFFIX) => {
                    return Err(StoreError::InvalidPath(format!(
                        "key {key:?} collides with sidecar naming"
                    )));
                }
                Component::Normal(c) => components.push(c),
                Component::CurDir => {}
                Component::ParentDir => {
                    if components.pop().is_none() {
                        return Err(StoreError::InvalidPath(format!(
                            "key {key:?} escapes bucket {bucket:?}"
                        )));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::InvalidPath(format!("key {key:?} is absolute")));
                }
            }
        }
        if components.is_empty() {
            return Err(StoreError::InvalidPath(format!(
                "key {key:?} resolves to the bucket itself"
            )));
        }

        let mut path = self.root.join(bucket);
        path.extend(components);
        Ok(path)
    }

    fn create_parent(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) => DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(parent),
            None => Ok(()),
        }
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(path)?;
        file.write_all(bytes)?;
        if self.fsync {
            file.sync_all()?;
        }
        Ok(())
    }

    fn concat(&self, sources: &[PathBuf], dest: &Path) -> io::Result<u64> {
        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(FILE_MODE)
            .open(dest)?;
        let mut size = 0;
        for source in sources {
            size += io::copy(&mut File::open(source)?, &mut out)?;
        }
        if self.fsync {
            out.sync_all()?;
        }
        Ok(size)
    }
}

fn meta_path(path: &Path) -> PathBuf {
    let mut meta = path.as_os_str().to_owned();
    meta.push(META_SUFFIX);
    PathBuf::from(meta)
}

fn not_found(bucket: &str, key: &str) -> StoreError {
    StoreError::NotFound(format!("{bucket}/{key}"))
}

/// Directories are not objects, so they read as absent.
fn ensure_object(path: &Path, bucket: &str, key: &str) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(not_found(bucket, key)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(not_found(bucket, key)),
        Err(err) => Err(err.into()),
    }
}

fn open_object(path: &Path, bucket: &str, key: &str) -> Result<File> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(not_found(bucket, key)),
        Err(err) => return Err(err.into()),
    };
    if !file.metadata()?.is_file() {
        return Err(not_found(bucket, key));
    }
    Ok(file)
}

fn read_timestamp(path: &Path, file: &File) -> io::Result<i64> {
    match fs::read(meta_path(path)) {
        Ok(bytes) => match <[u8; 8]>::try_from(bytes.as_slice()) {
            Ok(raw) => return Ok(u64::from_le_bytes(raw) as i64),
            Err(_) => debug!(path = %path.display(), len = bytes.len(), "corrupt sidecar, using mtime"),
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "missing sidecar, using mtime")
        }
        Err(err) => debug!(path = %path.display(), error = %err, "unreadable sidecar, using mtime"),
    }
    let modified = file.metadata()?.modified()?;
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    Ok(i64::try_from(nanos).unwrap_or(i64::MAX))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        res => res,
    }
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
