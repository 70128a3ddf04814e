use clap::Parser;
use registry_peek::orchestrator::PeekTarget;
use registry_peek::reference::ImageReference;

use super::context::Ctx;

/// Enumerate one layer's (or every unpeeked layer's) filesystem entries and
/// persist the result to the catalog.
#[derive(Parser, Debug)]
#[clap(version, about = "Peek a layer's tar entries", long_about = None)]
pub struct Peek {
    reference: String,
    #[arg(long)]
    arch: Option<String>,
    /// Peek only this layer index; defaults to every unpeeked layer.
    #[arg(long)]
    layer: Option<i64>,
}

impl Peek {
    pub async fn run(&self, ctx: &Ctx) -> anyhow::Result<()> {
        let r = ImageReference::parse(&self.reference)?;
        let target = match self.layer {
            Some(i) => PeekTarget::Layer(i),
            None => PeekTarget::All,
        };
        ctx.orchestrator
            .peek(&r.namespace, &r.repo, &r.tag, self.arch.as_deref(), target)
            .await?;
        println!("peek complete for {r}");
        Ok(())
    }
}
