use clap::Parser;
use registry_peek::orchestrator::DirectoryView;
use registry_peek::reference::ImageReference;

use super::context::Ctx;

/// List the direct children of a path: a single layer's view, or the
/// overlay-merged view across every peeked layer.
#[derive(Parser, Debug)]
#[clap(version, about = "List a directory's entries", long_about = None)]
pub struct Directory {
    reference: String,
    #[arg(default_value = "/")]
    path: String,
    #[arg(long)]
    layer: Option<i64>,
    #[arg(long)]
    arch: Option<String>,
}

impl Directory {
    pub async fn run(&self, ctx: &Ctx) -> anyhow::Result<()> {
        let r = ImageReference::parse(&self.reference)?;
        let view = ctx.orchestrator.directory(
            &r.namespace,
            &r.repo,
            &r.tag,
            &self.path,
            self.layer,
            self.arch.as_deref(),
        )?;
        match view {
            DirectoryView::Single(entries) => {
                for e in entries {
                    println!("{} {:>10} {}", e.mode, e.size, e.name);
                }
            }
            DirectoryView::Merged(entries) => {
                for m in entries {
                    let mark = if m.overridden { "(overridden)" } else { "" };
                    println!(
                        "{} {:>10} {} [layer {}] {}",
                        m.entry.mode, m.entry.size, m.entry.name, m.layer_index, mark
                    );
                }
            }
        }
        Ok(())
    }
}
