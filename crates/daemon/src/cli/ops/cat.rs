use std::path::PathBuf;

use clap::Args;
use common::upload::FetchError;

use crate::cli::op::ServiceStartError;

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Storage identity, e.g. file_1718000000000.bin
    pub identity: String,

    /// Write the plaintext here instead of printing it
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error(transparent)]
    Service(#[from] ServiceStartError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cat {
    type Error = CatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let service = ctx.start_service().await?;
        let result = service
            .state()
            .uploads()
            .fetch_plaintext(&self.identity)
            .await;
        service.shutdown().await;
        let bytes = result?;

        if let Some(path) = &self.output {
            tokio::fs::write(path, &bytes)
                .await
                .map_err(|source| CatError::Write {
                    path: path.clone(),
                    source,
                })?;
            return Ok(format!("wrote {} bytes to {}", bytes.len(), path.display()));
        }

        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                // Binary content - show hex representation
                let hex = e
                    .as_bytes()
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" ");
                Ok(format!("Binary content (hex): {}", hex))
            }
        }
    }
}
