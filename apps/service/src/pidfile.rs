use std::path::{Path, PathBuf};
use std::{fs, io, process};

use tracing::warn;

/// PID file owned by the running daemon; removed again on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id (decimal, no trailing newline) to `path`.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        fs::write(&path, process::id().to_string())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove PID file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_written_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickprobe.pid");

        let pid_file = PidFile::create(&path).unwrap();
        assert_eq!(fs::read_to_string(pid_file.path()).unwrap(), process::id().to_string());

        drop(pid_file);
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir/tickprobe.pid");

        assert!(PidFile::create(path).is_err());
    }
}
