//! File system utils.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context;
use fs2::FileExt;

pub struct FsHandler;

impl FsHandler {
    pub fn set_writable(path: &Path) -> anyhow::Result<()> {
        let metadata = std::fs::metadata(path).context("Failed to get metadata for file")?;

        let mut perms = metadata.permissions();

        perms.set_readonly(false);

        std::fs::set_permissions(path, perms)
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;

        Ok(())
    }

    /// Create a directory (and its parents) if it doesn't exist and make sure it is writable.
    pub fn create_data_directory(path: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
        tracing::debug!("Created data directory: {}", path.display());

        Self::set_writable(path)
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;

        Ok(())
    }

    /// Replace the content of `path` in one step.
    ///
    /// The content is written to a sibling temporary file which is then renamed
    /// over `path`, so readers never observe a partially written file.
    pub fn write_atomic(path: &Path, content: &[u8]) -> anyhow::Result<()> {
        let file_name = path
            .file_name()
            .context("File path must have a file name")?
            .to_string_lossy();
        let tmp_path: PathBuf = path.with_file_name(format!(".{file_name}.tmp"));

        std::fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to move {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    /// Take an exclusive advisory lock on `path`, creating the file if needed.
    ///
    /// Fails immediately if another process holds the lock. The lock is
    /// released when the returned file is dropped.
    pub fn lock_exclusive(path: &Path) -> anyhow::Result<File> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            format!(
                "{} is locked, is another deployment running against this network?",
                path.display()
            )
        })?;

        Ok(file)
    }
}
