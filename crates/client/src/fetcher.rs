//! Latent container download and decoding.
//!
//! The backend uploads each finished latent to a content store under its
//! image id. [`ArtifactFetcher::fetch`] streams that object into a local
//! file and [`ArtifactFetcher::deserialize`] opens it and extracts the
//! latent tensor.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use unfuzzed_core::latent::{LatentContainer, Tensor, LATENT_TENSOR_KEY};

use crate::error::ClientError;

/// Downloads latent containers from `{data_url}/{image_id}`.
pub struct ArtifactFetcher {
    http: reqwest::Client,
    data_url: String,
    output_dir: PathBuf,
    /// Per-instance suffix keeping file names unique across clients.
    prefix: String,
}

impl ArtifactFetcher {
    /// * `data_url`   - content store base URL, e.g. `https://data.unfuzzed.org`.
    /// * `output_dir` - directory receiving downloaded containers.
    pub fn new(data_url: String, output_dir: PathBuf) -> Self {
        Self::with_client(reqwest::Client::new(), data_url, output_dir)
    }

    /// Create a fetcher reusing an existing [`reqwest::Client`].
    pub fn with_client(http: reqwest::Client, data_url: String, output_dir: PathBuf) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            http,
            data_url: data_url.trim_end_matches('/').to_string(),
            output_dir,
            prefix: format!("_temp_{}", &suffix[..8]),
        }
    }

    /// Local path the container for `image_id` is written to.
    pub fn file_path(&self, image_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("unfuzzed{}_{image_id}.latent", self.prefix))
    }

    /// Download the container for `image_id` and return its local path.
    ///
    /// The body is streamed chunk by chunk. A transfer that fails midway
    /// leaves no file behind.
    pub async fn fetch(&self, image_id: &str) -> Result<PathBuf, ClientError> {
        let url = format!("{}/{image_id}", self.data_url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Transfer(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Transfer(format!("GET {url} returned {status}")));
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| io_error(&self.output_dir, e))?;

        let path = self.file_path(image_id);
        let written = match write_body(response, &url, &path).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %path.display(),
                            error = %rm,
                            "Failed to remove partial download",
                        );
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(image_id, bytes = written, path = %path.display(), "Latents downloaded");
        Ok(path)
    }

    /// Open a downloaded container and extract its latent tensor.
    pub async fn deserialize(path: &Path) -> Result<Tensor, ClientError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::Format(format!("Cannot read {}: {e}", path.display())))?;
        let mut container =
            LatentContainer::from_bytes(&bytes).map_err(|e| ClientError::Format(e.to_string()))?;
        container
            .take(LATENT_TENSOR_KEY)
            .map_err(|e| ClientError::Format(e.to_string()))
    }
}

/// Stream `response` into a new file at `path`, returning the bytes written.
async fn write_body(
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<usize, ClientError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| io_error(path, e))?;

    let mut body = response.bytes_stream();
    let mut written = 0usize;
    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|e| ClientError::Transfer(format!("Reading body of {url} failed: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| io_error(path, e))?;
        written += chunk.len();
    }
    file.flush().await.map_err(|e| io_error(path, e))?;
    Ok(written)
}

fn io_error(path: &Path, err: std::io::Error) -> ClientError {
    ClientError::Transfer(format!("I/O error on {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_embed_prefix_and_image_id() {
        let fetcher = ArtifactFetcher::new("https://data.example/".into(), PathBuf::from("/tmp/x"));
        let path = fetcher.file_path("IMG1");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("unfuzzed_temp_"));
        assert!(name.ends_with("_IMG1.latent"));
        assert_eq!(path.parent().unwrap(), Path::new("/tmp/x"));
    }

    #[test]
    fn separate_fetchers_use_distinct_prefixes() {
        let a = ArtifactFetcher::new("http://d".into(), PathBuf::from("/tmp"));
        let b = ArtifactFetcher::new("http://d".into(), PathBuf::from("/tmp"));
        assert_ne!(a.file_path("IMG1"), b.file_path("IMG1"));
    }
}
