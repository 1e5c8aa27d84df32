//! Consolidated credential artifact.
//!
//! Merges every raw credential file in a session's working directory into a
//! single JSON document mapping file name to file contents, and writes it
//! back into the same directory. Keys are sorted and the artifact itself is
//! excluded from its own input, so re-running over unchanged contents
//! produces the same bytes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ArtifactError;

/// File name of the consolidated artifact inside a working directory.
pub const ARTIFACT_FILE_NAME: &str = "session.json";

const ARTIFACT_TMP_NAME: &str = ".session.json.tmp";

/// Path the artifact for `working_dir` is written to.
pub fn artifact_path(working_dir: &Path) -> PathBuf {
    working_dir.join(ARTIFACT_FILE_NAME)
}

/// Read every raw credential file in `working_dir`.
pub async fn collect(working_dir: &Path) -> Result<BTreeMap<String, String>, ArtifactError> {
    let mut files = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(working_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if name == ARTIFACT_FILE_NAME || name == ARTIFACT_TMP_NAME {
            continue;
        }

        let bytes = tokio::fs::read(entry.path()).await?;
        match String::from_utf8(bytes) {
            Ok(contents) => {
                files.insert(name, contents);
            }
            Err(_) => {
                tracing::warn!(file = %name, "Skipping credential file with non UTF-8 contents");
            }
        }
    }

    Ok(files)
}

/// Build the consolidated document and write it into `working_dir`.
///
/// The document is written to a temporary file first and renamed into
/// place, so readers never observe a partial artifact.
pub async fn materialize(working_dir: &Path) -> Result<PathBuf, ArtifactError> {
    let files = collect(working_dir).await?;
    let document = serde_json::to_vec_pretty(&files)?;

    let tmp = working_dir.join(ARTIFACT_TMP_NAME);
    let path = artifact_path(working_dir);
    tokio::fs::write(&tmp, &document).await?;
    tokio::fs::rename(&tmp, &path).await?;

    tracing::debug!(
        path = %path.display(),
        files = files.len(),
        "Materialized credential artifact"
    );
    Ok(path)
}

/// Load a previously written artifact.
pub async fn load(path: &Path) -> Result<BTreeMap<String, String>, ArtifactError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
