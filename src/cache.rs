use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::error::{ReelError, ReelResult};
use crate::reader::{FileInfo, FrameReader};

/// Per-path metadata cache keyed by (absolute path, mtime).
///
/// Fps auto-detection, resolution probing and layer discovery all want the
/// same frame's metadata; on network storage every avoided open matters. A
/// modified file (new mtime) misses the cache and is re-probed. Constructed
/// once and passed by handle wherever metadata is needed; safe for concurrent
/// keyed access.
#[derive(Debug, Default)]
pub struct FileInfoCache {
    entries: Mutex<HashMap<PathBuf, (SystemTime, FileInfo)>>,
}

impl FileInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path, reader: &mut dyn FrameReader) -> ReelResult<FileInfo> {
        let abs = path
            .canonicalize()
            .map_err(|e| ReelError::read(format!("cannot stat {}: {e}", path.display())))?;
        let mtime = std::fs::metadata(&abs)
            .and_then(|m| m.modified())
            .map_err(|e| ReelError::read(format!("cannot stat {}: {e}", abs.display())))?;

        {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((cached_mtime, info)) = entries.get(&abs)
                && *cached_mtime == mtime
            {
                return Ok(info.clone());
            }
        }

        let info = reader.file_info(&abs)?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(abs, (mtime, info.clone()));
        Ok(info)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
