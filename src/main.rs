#[macro_use]
extern crate tracing;

use clap::Parser;
use cmd::{
    carve::Carve, directory::Directory, history::History, layer_status::LayerStatus, peek::Peek,
    resolve_config::ResolveConfig, search::Search, stream::StreamLayer,
};

use crate::cmd::context::Ctx;

mod cmd;

#[derive(Parser, Debug)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    ResolveConfig(ResolveConfig),
    LayerStatus(LayerStatus),
    Peek(Peek),
    Carve(Carve),
    StreamLayer(StreamLayer),
    Directory(Directory),
    Search(Search),
    History(History),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ctx = Ctx::init()?;
    let args = Args::parse();

    match args.command {
        Commands::ResolveConfig(cmd) => cmd.run(&ctx).await?,
        Commands::LayerStatus(cmd) => cmd.run(&ctx).await?,
        Commands::Peek(cmd) => cmd.run(&ctx).await?,
        Commands::Carve(cmd) => cmd.run(&ctx).await?,
        Commands::StreamLayer(cmd) => cmd.run(&ctx).await?,
        Commands::Directory(cmd) => cmd.run(&ctx).await?,
        Commands::Search(cmd) => cmd.run(&ctx).await?,
        Commands::History(cmd) => cmd.run(&ctx).await?,
    }
    Ok(())
}
