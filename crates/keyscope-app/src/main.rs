//! keyscope - terminal key browser for Redis
//!
//! Connects, scans the key-space on a worker task while rendering progress,
//! then prints the keys that pass the live filter.

mod cli;
mod logging;
mod presenter;
mod settings;

use anyhow::Context;
use clap::Parser;
use keyscope_core::{ScanSession, ScanStatus};
use keyscope_driver_redis::RedisSource;
use std::sync::Arc;

use crate::cli::Cli;
use crate::presenter::Presenter;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);

    logging::init(settings.logging.to_config().verbose(cli.verbose))
        .context("Failed to initialize logging")?;

    let source = RedisSource::connect(settings.connection.clone())
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {}:{}",
                settings.connection.host, settings.connection.port
            )
        })?;

    let session = ScanSession::new(Arc::new(source));
    let filter = session.filter();
    filter.set_predicate(&cli.filter);

    let options = settings.scan.to_options();
    let mut presenter = Presenter::new(
        std::io::stderr(),
        std::io::stdout(),
        options.with_metadata,
        cli.plain,
    );

    session
        .start_with(options)
        .context("Failed to start scan")?;
    let mut progress = session.subscribe();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    loop {
        let snapshot = progress.borrow_and_update().clone();
        presenter.render_progress(&snapshot);
        if !snapshot.status.is_running() {
            break;
        }

        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut ctrl_c, if !cancel_requested => {
                tracing::info!("interrupt received, cancelling scan");
                cancel_requested = true;
                session.cancel();
            }
        }
    }

    presenter.finish_progress();
    let final_progress = session.progress();
    let visible = filter.visible_items();
    presenter.render_items(&visible)?;
    presenter.render_summary(&final_progress, visible.len(), &cli.filter)?;

    match final_progress.status {
        ScanStatus::Failed(err) => Err(err).context("Scan failed"),
        _ => Ok(()),
    }
}
