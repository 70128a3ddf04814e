use clap::Parser;
use registry_peek::reference::ImageReference;

use super::context::Ctx;

/// Show cached layer peek/carve status for an image reference.
#[derive(Parser, Debug)]
#[clap(version, about = "Show per-layer peek status", long_about = None)]
pub struct LayerStatus {
    reference: String,
    #[arg(long)]
    arch: Option<String>,
}

impl LayerStatus {
    pub async fn run(&self, ctx: &Ctx) -> anyhow::Result<()> {
        let r = ImageReference::parse(&self.reference)?;
        let status = ctx
            .orchestrator
            .layer_status(&r.namespace, &r.repo, &r.tag, self.arch.as_deref())?;
        match status {
            Some(status) => {
                println!(
                    "{} layers, {} peeked, {} unpeeked",
                    status.layer_count, status.peeked_count, status.unpeeked_count
                );
                for layer in &status.layers {
                    println!(
                        "  [{}] {} ({} bytes) peeked={}",
                        layer.layer_index, layer.digest, layer.size, layer.peeked
                    );
                }
            }
            None => println!("no cached config for {r}; run resolve-config first"),
        }
        Ok(())
    }
}
