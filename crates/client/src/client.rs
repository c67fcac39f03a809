//! High-level client combining correlation and artifact retrieval.
//!
//! [`UnfuzzedClient`] owns its connection for its whole lifetime, so
//! consecutive samples reuse one WebSocket. Methods take `&mut self`: a
//! client has at most one request in flight.

use std::path::PathBuf;

use unfuzzed_core::age_check;
use unfuzzed_core::latent::Tensor;

use crate::config::ClientConfig;
use crate::correlator::RequestCorrelator;
use crate::error::ClientError;
use crate::fetcher::ArtifactFetcher;
use crate::transport::{Connector, WsConnector};

pub struct UnfuzzedClient {
    correlator: RequestCorrelator,
    fetcher: ArtifactFetcher,
}

impl UnfuzzedClient {
    /// Client talking to the endpoints named in `config` over WebSocket.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_connector(
            Box::new(WsConnector::new(config.ws_url.clone())),
            ArtifactFetcher::new(config.data_url.clone(), config.output_dir.clone()),
        )
    }

    /// Client using a caller-supplied transport factory.
    pub fn with_connector(connector: Box<dyn Connector>, fetcher: ArtifactFetcher) -> Self {
        Self {
            correlator: RequestCorrelator::new(connector),
            fetcher,
        }
    }

    /// Number of WebSocket connections opened so far.
    pub fn connections_made(&self) -> u32 {
        self.correlator.connection().connections_made()
    }

    /// Submit a prompt, wait for both acks and download the result.
    ///
    /// Returns the path of the downloaded container. There is no timeout:
    /// an unresponsive relay blocks this call indefinitely.
    pub async fn generate(
        &mut self,
        positive_prompt: &str,
        negative_prompt: &str,
    ) -> Result<PathBuf, ClientError> {
        let image_id = self
            .correlator
            .submit(positive_prompt, negative_prompt)
            .await?;
        self.fetcher.fetch(&image_id).await
    }

    /// Generate and decode a latent, gated on the age-confirmation key.
    ///
    /// The key is checked before any network traffic.
    pub async fn sample(
        &mut self,
        key: &str,
        positive_prompt: &str,
        negative_prompt: &str,
    ) -> Result<Tensor, ClientError> {
        age_check::verify_key(key).map_err(ClientError::Policy)?;
        let path = self.generate(positive_prompt, negative_prompt).await?;
        ArtifactFetcher::deserialize(&path).await
    }
}
