use clap::Parser;
use registry_peek::catalog::{HistorySort, SortOrder};

use super::context::Ctx;

/// Paginated, sortable view of every layer peeked so far.
#[derive(Parser, Debug)]
#[clap(version, about = "List peek history", long_about = None)]
pub struct History {
    query: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 50)]
    page_size: u32,
    #[arg(long, value_enum, default_value_t = SortField::ScrapedAt)]
    sort_by: SortField,
    #[arg(long)]
    descending: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SortField {
    ScrapedAt,
    Namespace,
    Repo,
    Tag,
    LayerIndex,
    LayerSize,
}

impl From<SortField> for HistorySort {
    fn from(f: SortField) -> Self {
        match f {
            SortField::ScrapedAt => HistorySort::ScrapedAt,
            SortField::Namespace => HistorySort::Namespace,
            SortField::Repo => HistorySort::Repo,
            SortField::Tag => HistorySort::Tag,
            SortField::LayerIndex => HistorySort::LayerIndex,
            SortField::LayerSize => HistorySort::LayerSize,
        }
    }
}

impl History {
    pub async fn run(&self, ctx: &Ctx) -> anyhow::Result<()> {
        let order = if self.descending {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        };
        let rows = ctx.orchestrator.history(
            self.query.as_deref(),
            self.page,
            self.page_size,
            self.sort_by.into(),
            order,
        )?;
        for row in rows {
            println!(
                "{} {}/{}:{} [layer {}] {} entries, scraped {}",
                row.layer_digest,
                row.namespace,
                row.repo,
                row.tag,
                row.layer_index,
                row.entries_count,
                row.scraped_at
            );
        }
        Ok(())
    }
}
