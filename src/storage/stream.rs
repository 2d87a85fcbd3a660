//! Append-only page streams and read-only views over them.
//!
//! Writers only ever append. Readers get a [`ByteView`] of the whole file,
//! either memory-mapped or copied into memory depending on
//! [`ReadMode`]. Views are cached per path for the life of a database
//! handle and replaced only when the file has grown since it was mapped.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use memmap2::Mmap;
use tracing::debug;

use crate::config::{ReadMode, SyncMode};
use crate::error::{FoldTreeError, Result};

/// A writer that knows how many bytes its target holds.
///
/// Page writers record offsets into the streams they append to, so every
/// sink must report its current end position.
pub trait OffsetWriter: Write {
    /// Offset the next written byte will land at.
    fn position(&self) -> u64;
}

impl OffsetWriter for Vec<u8> {
    fn position(&self) -> u64 {
        self.len() as u64
    }
}

/// Buffered append handle to one stream file.
#[derive(Debug)]
pub struct AppendStream {
    path: PathBuf,
    writer: BufWriter<File>,
    position: u64,
}

impl AppendStream {
    /// Opens (creating if needed) a stream for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let position = file.metadata()?.len();
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            position,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pushes buffered bytes to the OS, and to disk under
    /// [`SyncMode::Paranoid`].
    pub fn commit(&mut self, sync_mode: SyncMode) -> Result<()> {
        self.writer.flush()?;
        if sync_mode.is_paranoid() {
            self.writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl Write for AppendStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl OffsetWriter for AppendStream {
    fn position(&self) -> u64 {
        self.position
    }
}

/// Read-only bytes of a stream file.
///
/// Cloning is cheap; both variants share their storage.
#[derive(Clone, Debug)]
pub enum ByteView {
    /// Memory-mapped file.
    Mapped(Arc<Mmap>),
    /// File contents copied into memory.
    Owned(Arc<Vec<u8>>),
}

impl ByteView {
    /// A view with no bytes, used for files that do not exist yet.
    pub fn empty() -> Self {
        ByteView::Owned(Arc::new(Vec::new()))
    }
}

impl Deref for ByteView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ByteView::Mapped(map) => map,
            ByteView::Owned(bytes) => bytes,
        }
    }
}

/// Per-handle cache of stream views.
#[derive(Debug)]
pub struct ViewCache {
    mode: ReadMode,
    views: Mutex<HashMap<PathBuf, ByteView>>,
}

impl ViewCache {
    /// Creates an empty cache.
    pub fn new(mode: ReadMode) -> Self {
        Self {
            mode,
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a view of the file at `path`.
    ///
    /// A missing or empty file yields an empty view. A cached view is
    /// reused unless the file has grown since it was taken.
    pub fn view(&self, path: &Path) -> Result<ByteView> {
        let len = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ByteView::empty()),
            Err(err) => return Err(err.into()),
        };
        if len == 0 {
            return Ok(ByteView::empty());
        }

        let mut views = self
            .views
            .lock()
            .map_err(|_| FoldTreeError::LockPoisoned("view cache"))?;

        if let Some(view) = views.get(path) {
            if view.len() as u64 >= len {
                return Ok(view.clone());
            }
        }

        let view = self.load(path)?;
        debug!(path = %path.display(), len = view.len(), "Loaded stream view");
        views.insert(path.to_path_buf(), view.clone());
        Ok(view)
    }

    /// Drops every cached view.
    pub fn clear(&self) {
        if let Ok(mut views) = self.views.lock() {
            views.clear();
        }
    }

    fn load(&self, path: &Path) -> Result<ByteView> {
        let mut file = File::open(path)?;
        match self.mode {
            ReadMode::Mapped => {
                // SAFETY: streams are append-only; bytes already mapped are
                // never rewritten while the handle is open.
                let map = unsafe { Mmap::map(&file)? };
                Ok(ByteView::Mapped(Arc::new(map)))
            }
            ReadMode::Buffered => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                Ok(ByteView::Owned(Arc::new(bytes)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_stream_tracks_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.vec");

        let mut stream = AppendStream::open(&path).unwrap();
        assert_eq!(stream.position(), 0);
        stream.write_all(b"hello").unwrap();
        assert_eq!(stream.position(), 5);
        stream.commit(SyncMode::Normal).unwrap();
        drop(stream);

        let mut reopened = AppendStream::open(&path).unwrap();
        assert_eq!(reopened.position(), 5);
        reopened.write_all(b"!").unwrap();
        reopened.commit(SyncMode::Paranoid).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello!");
    }

    #[test]
    fn test_missing_file_is_empty_view() {
        let dir = tempdir().unwrap();
        let cache = ViewCache::new(ReadMode::Mapped);
        let view = cache.view(&dir.path().join("missing.ix")).unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_view_remaps_after_growth() {
        for mode in [ReadMode::Mapped, ReadMode::Buffered] {
            let dir = tempdir().unwrap();
            let path = dir.path().join("a.pos");
            let cache = ViewCache::new(mode);

            let mut stream = AppendStream::open(&path).unwrap();
            stream.write_all(&[1, 2, 3]).unwrap();
            stream.commit(SyncMode::Normal).unwrap();
            assert_eq!(&cache.view(&path).unwrap()[..], &[1, 2, 3]);

            stream.write_all(&[4]).unwrap();
            stream.commit(SyncMode::Normal).unwrap();
            assert_eq!(&cache.view(&path).unwrap()[..], &[1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_vec_offset_writer() {
        let mut buf = Vec::new();
        buf.write_all(&[0; 7]).unwrap();
        assert_eq!(OffsetWriter::position(&buf), 7);
    }
}
