mod cli;

use clap::Parser;
use cli::Cli;
use pg_probe::engine::Engine;
use pg_probe::output::OutputChannel;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let cfg = cli.into_config()?;

    let sink = OutputChannel::new(cfg.output.clone())?;
    let mut engine = Engine::new(cfg, sink)?;

    let ctx = engine.context().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted; cancelling in-flight probes");
            ctx.cancel();
        }
    });

    let summary = engine.run().await?;
    info!(
        scanned = summary.scanned,
        detected = summary.detected,
        errors = summary.errors,
        "scan finished"
    );

    Ok(())
}
