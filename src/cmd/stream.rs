use clap::Parser;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::context::Ctx;

/// Stream a layer's raw (still-compressed) bytes to stdout, unmodified.
#[derive(Parser, Debug)]
#[clap(version, about = "Stream a raw layer blob", long_about = None)]
pub struct StreamLayer {
    namespace: String,
    repo: String,
    digest: String,
}

impl StreamLayer {
    pub async fn run(&self, ctx: &Ctx) -> anyhow::Result<()> {
        let mut stream = Box::pin(
            ctx.orchestrator
                .stream_layer(&self.namespace, &self.repo, &self.digest)
                .await?,
        );
        let mut stdout = tokio::io::stdout();
        while let Some(chunk) = stream.next().await {
            stdout.write_all(&chunk?).await?;
        }
        stdout.flush().await?;
        Ok(())
    }
}
