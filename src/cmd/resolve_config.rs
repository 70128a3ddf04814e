use clap::Parser;
use registry_peek::reference::ImageReference;

use super::context::Ctx;

/// Resolve an image reference's config JSON, using the catalog as a cache
/// unless `--force-refresh` is given.
#[derive(Parser, Debug)]
#[clap(version, about = "Resolve an image's config JSON", long_about = None)]
pub struct ResolveConfig {
    /// `[namespace/]repo[:tag]`, e.g. `grafana/loki:2.9.0`
    reference: String,
    #[arg(long)]
    arch: Option<String>,
    #[arg(long)]
    force_refresh: bool,
}

impl ResolveConfig {
    pub async fn run(&self, ctx: &Ctx) -> anyhow::Result<()> {
        let r = ImageReference::parse(&self.reference)?;
        let config = ctx
            .orchestrator
            .resolve_config(
                &r.namespace,
                &r.repo,
                &r.tag,
                self.arch.as_deref(),
                self.force_refresh,
            )
            .await?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        Ok(())
    }
}
