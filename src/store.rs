use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tempfile::Builder;

use crate::domain::{MetadataSet, PostId};
use crate::error::EdgesetError;

pub const METADATA_FILE: &str = "meta.json";

/// On-disk layout of a downloaded dataset: `meta.json` plus one
/// `{id}.{ext}` file per post, all directly under the root.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: Utf8PathBuf,
}

impl DatasetStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn metadata_path(&self) -> Utf8PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Path of the image for `id`. Ids and extensions come from remote
    /// metadata, so anything that is not a plain file name component is
    /// rejected rather than joined onto the root.
    pub fn image_path(&self, id: &PostId, extension: &str) -> Result<Utf8PathBuf, EdgesetError> {
        let stem = id.to_string();
        if !is_plain_component(&stem) || !is_plain_component(extension) {
            return Err(EdgesetError::Metadata(format!(
                "refusing unsafe image name {stem:?}.{extension:?}"
            )));
        }
        Ok(self.root.join(format!("{stem}.{extension}")))
    }

    pub fn ensure_root(&self) -> Result<(), EdgesetError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| EdgesetError::Filesystem(format!("create {}: {err}", self.root)))
    }

    pub fn metadata_exists(&self) -> bool {
        self.metadata_path().as_std_path().exists()
    }

    pub fn load_metadata(&self) -> Result<MetadataSet, EdgesetError> {
        let path = self.metadata_path();
        let content = fs::read(path.as_std_path())
            .map_err(|err| EdgesetError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_slice(&content)
            .map_err(|err| EdgesetError::Metadata(format!("{path}: {err}")))
    }

    /// Serializes the whole set with 4-space indentation and moves it into
    /// place, so readers never observe a half-written file.
    pub fn write_metadata(&self, metadata: &MetadataSet) -> Result<(), EdgesetError> {
        let mut content = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = Serializer::with_formatter(&mut content, formatter);
        metadata
            .serialize(&mut serializer)
            .map_err(|err| EdgesetError::Metadata(err.to_string()))?;
        Self::write_bytes_atomic(&self.metadata_path(), &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), EdgesetError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| EdgesetError::Filesystem(format!("create {parent}: {err}")))?;
        let mut temp = Builder::new()
            .prefix(".edgeset-")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| EdgesetError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| EdgesetError::Filesystem(format!("write {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| EdgesetError::Filesystem(format!("persist {path}: {err}")))?;
        Ok(())
    }
}

fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\', ':', '\0'])
}
