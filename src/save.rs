//! Host save mechanism for finished exports.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::assemble::ExportedFile;
use crate::error::Result;

/// Where finished files go.
pub trait SaveTarget {
    /// Persist `file` and return where it ended up.
    fn save(&self, file: &ExportedFile) -> Result<PathBuf>;
}

/// Writes `<dir>/<filename>`. The bytes go to a temporary sibling first and
/// are renamed into place, so a failed write leaves no partial file.
#[derive(Debug, Clone)]
pub struct DirectorySaveTarget {
    dir: PathBuf,
}

impl DirectorySaveTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SaveTarget for DirectorySaveTarget {
    fn save(&self, file: &ExportedFile) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(&file.filename);
        let partial = self.dir.join(format!(".{}.part", file.filename));

        let written = fs::File::create(&partial).and_then(|mut f| {
            f.write_all(&file.bytes)?;
            f.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&partial, &target)) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        log::debug!("Saved {} ({} bytes)", target.display(), file.bytes.len());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    #[test]
    fn writes_file_under_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let target = DirectorySaveTarget::new(dir.path().join("out"));
        let file = ExportedFile::pdf("Report", b"%PDF-1.7 test".to_vec());
        let path = target.save(&file).unwrap();
        assert_eq!(path, dir.path().join("out").join("Report.pdf"));
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.7 test");
        // Only the final file remains.
        assert_eq!(fs::read_dir(dir.path().join("out")).unwrap().count(), 1);
    }

    #[test]
    fn unwritable_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let target = DirectorySaveTarget::new(&blocker);
        let file = ExportedFile::pdf("x", vec![1, 2, 3]);
        let err = target.save(&file).unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
    }
}
