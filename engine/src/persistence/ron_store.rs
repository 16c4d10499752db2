use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;

use crate::{
    persistence::{PersistenceError, PersistenceStore, Snapshot},
    voxels::coord::ChunkPos,
};

/// One `.ron` file per chunk inside a directory.
pub struct RonDirectoryStore {
    directory: PathBuf,
}

impl RonDirectoryStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        RonDirectoryStore {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn chunk_path(&self, pos: ChunkPos) -> PathBuf {
        self.directory
            .join(format!("{}_{}_{}.ron", pos.x(), pos.y(), pos.z()))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl PersistenceStore for RonDirectoryStore {
    fn read(&self, pos: ChunkPos) -> Result<Option<Snapshot>, PersistenceError> {
        let path = self.chunk_path(pos);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path)(err)),
        };

        let snapshot = ron::from_str(&data).map_err(|source| PersistenceError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Some(snapshot))
    }

    fn write(&self, pos: ChunkPos, snapshot: Snapshot) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.directory).map_err(io_error(&self.directory))?;

        let serialized = ron::ser::to_string_pretty(&snapshot, PrettyConfig::default())?;

        // Write next to the target and rename, so readers never see a partial file
        let path = self.chunk_path(pos);
        let temp_path = path.with_extension("ron.tmp");
        std::fs::write(&temp_path, serialized).map_err(io_error(&temp_path))?;
        std::fs::rename(&temp_path, &path).map_err(io_error(&path))?;
        Ok(())
    }
}
