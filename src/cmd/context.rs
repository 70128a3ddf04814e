use anyhow::Context;
use registry_peek::catalog::Catalog;
use registry_peek::config::Settings;
use registry_peek::orchestrator::Orchestrator;

/// Shared state for every subcommand: logging is initialized once here, and
/// the catalog/orchestrator are opened against the resolved settings.
pub struct Ctx {
    pub orchestrator: Orchestrator,
}

impl Ctx {
    pub fn init() -> anyhow::Result<Self> {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();

        let settings = Settings::resolve();
        info!(path = %settings.catalog_path.display(), "opening catalog");
        let catalog =
            Catalog::open(&settings.catalog_path).context("failed to open catalog database")?;
        Ok(Self {
            orchestrator: Orchestrator::new(catalog),
        })
    }
}
