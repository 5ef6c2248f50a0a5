use std::path::PathBuf;

use clap::Args;
use common::upload::UploadError;

use crate::cli::op::ServiceStartError;

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Owner the upload is recorded under
    #[arg(long)]
    pub owner: i64,

    /// Name to record instead of the file name
    #[arg(long)]
    pub name: Option<String>,

    /// File to upload
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error(transparent)]
    Service(#[from] ServiceStartError),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Upload(#[from] UploadError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Put {
    type Error = PutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let plaintext = tokio::fs::read(&self.path)
            .await
            .map_err(|source| PutError::Read {
                path: self.path.clone(),
                source,
            })?;

        let name = match &self.name {
            Some(name) => name.clone(),
            None => self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let size = plaintext.len() as u64;

        let service = ctx.start_service().await?;
        let result = service
            .state()
            .uploads()
            .submit(self.owner, name.clone(), plaintext, size)
            .await;
        service.shutdown().await;

        let identity = result?;
        Ok(format!("{} ({}, {} bytes)", identity, name, size))
    }
}
