use anyhow::Context;
use clap::Parser;
use wmp_logger::Logger;
use wmp_vaultctl::cli::Cli;
use wmp_vaultctl::config::load_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = load_config(cli.config.as_deref()).context("Critical: Configuration is malformed")?;

    let builder = Logger::builder().name(env!("CARGO_PKG_NAME")).level_name(&cfg.log.level)?;
    let _log = match &cfg.log.dir {
        Some(dir) => builder.path(dir).json(cfg.log.json).init()?,
        None => builder.init()?,
    };

    wmp_vaultctl::run(cli, &cfg).await
}
