//! `run`: host the switch engine in the foreground until interrupted.

use std::sync::Arc;

use tracing::{error, info, warn};

use blockswitch_core::{
    Accessory, CoreError, EntityRegistry, LegacyClientService, Platform,
};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;
use crate::host::{FileRegistry, console, monitor};

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let controller = settings.controller_config()?;
    let platform_config = settings.platform_config()?;

    let registry = Arc::new(FileRegistry::open(settings.cache_path())?);
    info!(
        url = %controller.url,
        site = %controller.site,
        cache = %registry.path().display(),
        clients = platform_config.clients.len(),
        "starting"
    );

    let service = Arc::new(LegacyClientService::new(controller));
    let platform = Platform::new(
        platform_config,
        service,
        Arc::clone(&registry) as Arc<dyn EntityRegistry>,
    );

    for record in registry.restored() {
        platform.on_entity_restored(Accessory::from_record(record));
    }

    let monitor = tokio::spawn(monitor::run(platform.clone(), Arc::clone(&registry)));
    let reconcile = platform.on_ready()?.wait();
    let requests = platform.spawn_request_processor();
    let console = (!args.no_console).then(|| {
        tokio::spawn(console::run(
            platform.clone(),
            requests.clone(),
            console::spawn_stdin_reader(),
        ))
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    tokio::pin!(reconcile);

    let result = tokio::select! {
        signal = &mut ctrl_c => signal.map_err(CliError::from),
        report = &mut reconcile => match report {
            Ok(report) => {
                info!(
                    added = report.added.len(),
                    removed = report.removed.len(),
                    missing = report.missing.len(),
                    "reconciliation complete"
                );
                ctrl_c.await.map_err(CliError::from)
            }
            Err(CoreError::ShuttingDown) => Ok(()),
            // Authentication failed; nothing can be served
            Err(e) if !platform.is_ready() => Err(e.into()),
            Err(e) => {
                error!(error = %e, "reconciliation incomplete; serving existing switches");
                ctrl_c.await.map_err(CliError::from)
            }
        },
    };

    info!("shutting down");
    if let Some(console) = console {
        console.abort();
    }
    drop(requests);
    platform.shutdown().await;
    monitor.abort();

    for acc in platform.accessories().iter() {
        if let Err(e) = registry.update(acc) {
            warn!(mac = %acc.mac(), error = %e, "failed to update accessory cache");
        }
    }
    result
}
