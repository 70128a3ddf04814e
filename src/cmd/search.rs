use clap::Parser;

use super::context::Ctx;

/// Substring search across every cataloged entry, optionally scoped to a
/// namespace/repo/tag/layer.
#[derive(Parser, Debug)]
#[clap(version, about = "Search cataloged entries", long_about = None)]
pub struct Search {
    pattern: String,
    #[arg(long)]
    namespace: Option<String>,
    #[arg(long)]
    repo: Option<String>,
    #[arg(long)]
    tag: Option<String>,
    #[arg(long)]
    layer: Option<i64>,
}

impl Search {
    pub async fn run(&self, ctx: &Ctx) -> anyhow::Result<()> {
        let hits = ctx.orchestrator.search(
            &self.pattern,
            self.namespace.as_deref(),
            self.repo.as_deref(),
            self.tag.as_deref(),
            self.layer,
        )?;
        for hit in hits {
            println!(
                "{}/{}:{} [layer {}] {}",
                hit.namespace, hit.repo, hit.tag, hit.layer_index, hit.entry.name
            );
        }
        Ok(())
    }
}
