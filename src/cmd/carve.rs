use std::io::Write;

use clap::Parser;
use registry_peek::reference::ImageReference;

use super::context::Ctx;

/// Extract a single file's bytes from one layer, writing them to stdout.
#[derive(Parser, Debug)]
#[clap(version, about = "Carve a file out of one layer", long_about = None)]
pub struct Carve {
    reference: String,
    path: String,
    #[arg(long)]
    layer: i64,
    #[arg(long)]
    arch: Option<String>,
}

impl Carve {
    pub async fn run(&self, ctx: &Ctx) -> anyhow::Result<()> {
        let r = ImageReference::parse(&self.reference)?;
        let result = ctx
            .orchestrator
            .carve(
                &r.namespace,
                &r.repo,
                &r.tag,
                self.arch.as_deref(),
                &self.path,
                self.layer,
            )
            .await?;
        std::io::stdout().write_all(&result.hit.bytes)?;
        Ok(())
    }
}
