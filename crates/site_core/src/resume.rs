use backend::{Backend, BackendError};
use shared::{domain::StoredObject, error::SiteError};
use tracing::{info, warn};

use crate::network;

pub const DEFAULT_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// The most recently updated object wins; equal timestamps fall back to name.
pub fn newest(objects: &[StoredObject]) -> Option<&StoredObject> {
    objects.iter().max_by(|a, b| {
        a.updated_at
            .cmp(&b.updated_at)
            .then_with(|| a.name.cmp(&b.name))
    })
}

/// `Ok(None)` when nothing has been uploaded yet.
pub async fn latest(backend: &dyn Backend, bucket: &str) -> Result<Option<ResumeFile>, SiteError> {
    let objects = backend.list(bucket).await.map_err(unavailable)?;
    let Some(object) = newest(&objects) else {
        info!(%bucket, "resume bucket is empty");
        return Ok(None);
    };

    let bytes = match backend.download(bucket, &object.name).await {
        Ok(bytes) => bytes,
        Err(BackendError::Rejected { status: 404, .. }) => return Ok(None),
        Err(err) => return Err(unavailable(err)),
    };

    Ok(Some(ResumeFile {
        name: object.name.clone(),
        content_type: object
            .content_type
            .clone()
            .filter(|content_type| !content_type.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        bytes,
    }))
}

fn unavailable(err: BackendError) -> SiteError {
    warn!(error = %err, "resume download failed");
    network("Could not download the resume. Please try again later.")
}

#[cfg(test)]
#[path = "tests/resume_tests.rs"]
mod tests;
