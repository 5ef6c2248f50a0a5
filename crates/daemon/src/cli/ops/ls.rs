use clap::Args;
use object_store::BlobStoreError;

use crate::cli::op::ServiceStartError;

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Only list uploads of this owner
    #[arg(long)]
    pub owner: Option<i64>,

    /// Print rows as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    Service(#[from] ServiceStartError),
    #[error("failed to list uploads: {0}")]
    Database(#[from] BlobStoreError),
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let service = ctx.start_service().await?;
        let database = service.state().database().clone();
        let result = match self.owner {
            Some(owner) => database.list_files_for_owner(owner).await,
            None => database.list_files().await,
        };
        service.shutdown().await;
        let files = result?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&files)?);
        }

        if files.is_empty() {
            return Ok("No uploads found".to_string());
        }
        let output = files
            .iter()
            .map(|f| {
                format!(
                    "{}  owner={}  {} bytes  {}  {}",
                    f.identity,
                    f.owner_id,
                    f.size,
                    f.created_at.to_rfc3339(),
                    f.original_name
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(output)
    }
}
