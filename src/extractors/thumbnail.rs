use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::Result;

/// Downloads cover images referenced by a probe
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThumbnailSource: Send + Sync {
    async fn download(&self, url: &str, output_path: &Path) -> Result<()>;
}

/// Plain HTTP GET with a short timeout
pub struct HttpThumbnailSource {
    client: Client,
}

impl HttpThumbnailSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ThumbnailSource for HttpThumbnailSource {
    async fn download(&self, url: &str, output_path: &Path) -> Result<()> {
        tracing::debug!("Downloading thumbnail {} to {}", url, output_path.display());

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to download thumbnail: HTTP {}", response.status());
        }

        let mut file = tokio::fs::File::create(output_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
