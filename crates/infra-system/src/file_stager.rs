// File stager implementation
// reason: tokio::fs keeps staging I/O off the worker's run loop
use async_trait::async_trait;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

use sticky_core::domain::{LocalHandle, QueueId, ResourceLocator};
use sticky_core::port::{ResourceStager, StagerFactory, StepError};

/// Suffix of the file `process` writes next to the staged input
const SUMMARY_SUFFIX: &str = ".summary.json";

/// Stages files into a worker-local directory
///
/// Layout: `<root>/<job id>/<file name>`; `process` adds
/// `<file name>.summary.json` in the same directory and `release` removes the
/// whole job directory.
pub struct FileStager {
    root: PathBuf,
}

impl FileStager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a locator to a local source path (`file://` URL or plain path)
    fn source_path(locator: &ResourceLocator) -> Result<PathBuf, StepError> {
        let raw = locator.as_str();
        if !raw.contains("://") {
            return Ok(PathBuf::from(raw));
        }

        let url = Url::parse(raw)
            .map_err(|e| StepError::Acquisition(format!("invalid locator {}: {}", raw, e)))?;
        if url.scheme() != "file" {
            return Err(StepError::Acquisition(format!(
                "unsupported locator scheme: {}",
                url.scheme()
            )));
        }
        url.to_file_path()
            .map_err(|()| StepError::Acquisition(format!("{} is not a local file URL", raw)))
    }

    /// Job directories must be strictly inside this stager's root
    fn owns(&self, dir: &Path) -> bool {
        dir != self.root && dir.starts_with(&self.root)
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    source: String,
    lines: usize,
    words: usize,
    bytes: usize,
}

#[async_trait]
impl ResourceStager for FileStager {
    async fn acquire(
        &self,
        job_id: &str,
        locator: &ResourceLocator,
    ) -> Result<LocalHandle, StepError> {
        let separator = |c: char| c == '/' || c == '\\';
        if job_id.is_empty() || job_id == "." || job_id == ".." || job_id.contains(separator) {
            return Err(StepError::Acquisition(format!("invalid job id: {:?}", job_id)));
        }

        let source = Self::source_path(locator)?;
        let file_name = source.file_name().ok_or_else(|| {
            StepError::Acquisition(format!("{} does not name a file", locator.as_str()))
        })?;

        let dir = self.root.join(job_id);
        fs::create_dir_all(&dir).await.map_err(|e| {
            StepError::Acquisition(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let target = dir.join(file_name);
        match fs::copy(&source, &target).await {
            Ok(bytes) => {
                info!(
                    job_id = %job_id,
                    source = %source.display(),
                    target = %target.display(),
                    bytes = bytes,
                    "Staged resource"
                );
                Ok(LocalHandle::new(dir, target))
            }
            Err(e) => {
                // Leave nothing behind: the job never holds a handle to this dir
                if let Err(cleanup) = fs::remove_dir_all(&dir).await {
                    warn!(dir = %dir.display(), error = %cleanup, "Failed to clean partial staging");
                }
                Err(StepError::Acquisition(format!("{}: {}", source.display(), e)))
            }
        }
    }

    async fn process(&self, handle: &LocalHandle) -> Result<LocalHandle, StepError> {
        let path = handle.file();
        let bytes = fs::read(path)
            .await
            .map_err(|e| StepError::Processing(format!("cannot read {}: {}", path.display(), e)))?;
        let text = String::from_utf8(bytes).map_err(|e| {
            StepError::Processing(format!("{} is not valid UTF-8: {}", path.display(), e))
        })?;

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let summary = Summary {
            lines: text.lines().count(),
            words: text.split_whitespace().count(),
            bytes: text.len(),
            source: source.clone(),
        };
        let json = serde_json::to_vec_pretty(&summary)
            .map_err(|e| StepError::Processing(e.to_string()))?;

        let output = handle.dir.join(format!("{}{}", source, SUMMARY_SUFFIX));
        fs::write(&output, json).await.map_err(|e| {
            StepError::Processing(format!("cannot write {}: {}", output.display(), e))
        })?;

        info!(
            file = %path.display(),
            lines = summary.lines,
            words = summary.words,
            bytes = summary.bytes,
            "Processed staged resource"
        );
        Ok(LocalHandle::new(handle.dir.clone(), output))
    }

    async fn release(&self, handle: &LocalHandle) -> Result<(), StepError> {
        if !self.owns(&handle.dir) {
            return Err(StepError::Release(format!(
                "{} is outside staging root {}",
                handle.dir.display(),
                self.root.display()
            )));
        }

        match fs::remove_dir_all(&handle.dir).await {
            Ok(()) => {
                info!(dir = %handle.dir.display(), "Released staged resource");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %handle.dir.display(), "Already released");
                Ok(())
            }
            Err(e) => Err(StepError::Release(format!(
                "cannot remove {}: {}",
                handle.dir.display(),
                e
            ))),
        }
    }
}

/// One staging directory per pinned worker: `<root>/<queue id>`
pub struct FileStagerFactory {
    root: PathBuf,
}

impl FileStagerFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StagerFactory for FileStagerFactory {
    fn stager_for(&self, queue: &QueueId) -> Arc<dyn ResourceStager> {
        Arc::new(FileStager::new(self.root.join(queue.as_str())))
    }
}
