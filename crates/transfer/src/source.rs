use std::path::{Path, PathBuf};

use cineload_protocol::FileIdentity;

use crate::TransferError;
use crate::validation::guess_mime_type;

/// A local file selected for upload, with its identity captured at selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    identity: FileIdentity,
}

impl SourceFile {
    /// Stats `path` and derives its identity (file name, size, guessed MIME type).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let identity = FileIdentity::new(name, metadata.len(), guess_mime_type(path));
        tracing::debug!(
            path = %path.display(),
            size = identity.size,
            mime_type = %identity.mime_type,
            "source file opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            identity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn size(&self) -> u64 {
        self.identity.size
    }
}
