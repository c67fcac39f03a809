//! Turns a leased job into an uploaded latent container.

use std::path::PathBuf;
use std::sync::Arc;

use unfuzzed_core::latent::LatentContainer;
use unfuzzed_core::protocol::JobBody;

use crate::error::ProcessError;
use crate::generator::LatentGenerator;
use crate::storage::ObjectStore;

/// Image ids become file names and object keys; restrict them to a
/// conservative alphabet.
fn is_safe_image_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub struct JobProcessor {
    generator: Arc<dyn LatentGenerator>,
    store: Arc<dyn ObjectStore>,
    latent_scale: f32,
    work_dir: PathBuf,
}

impl JobProcessor {
    /// * `latent_scale` - multiplier applied to every raw latent value.
    /// * `work_dir`     - where containers are staged before upload.
    pub fn new(
        generator: Arc<dyn LatentGenerator>,
        store: Arc<dyn ObjectStore>,
        latent_scale: f32,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            generator,
            store,
            latent_scale,
            work_dir,
        }
    }

    /// Local staging path for `image_id`.
    pub fn container_path(&self, image_id: &str) -> PathBuf {
        self.work_dir.join(format!("{image_id}.latent"))
    }

    /// Generate, rescale, package and upload the latent for `job`.
    ///
    /// Returns only after the upload succeeded; the staged file is then
    /// removed (a failed removal is logged and ignored).
    pub async fn process(&self, job: &JobBody) -> Result<(), ProcessError> {
        if !is_safe_image_id(&job.image_id) {
            return Err(ProcessError::InvalidJob(format!(
                "unsafe image id '{}'",
                job.image_id
            )));
        }

        tracing::info!(image_id = %job.image_id, "Generating latent");
        let raw = self.generator.generate(job).await?;
        let latent = raw.scaled(self.latent_scale);

        // The format marker tells the downstream loader not to rescale.
        let bytes = LatentContainer::for_latent(latent).to_bytes();

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let path = self.container_path(&job.image_id);
        tokio::fs::write(&path, &bytes).await?;

        self.store.upload_file(&path, &job.image_id).await?;
        tracing::info!(image_id = %job.image_id, bytes = bytes.len(), "Latent uploaded");

        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged latent");
        }
        Ok(())
    }
}
