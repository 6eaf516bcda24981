//! Command dispatch.

pub mod check;
pub mod clients;
pub mod run;
pub mod set_password;

use blockswitch_config::Settings;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(args, global).await,
        Command::Check(args) => check::handle(args, global).await,
        Command::Clients(args) => clients::handle(args, global).await,
        Command::SetPassword(args) => set_password::handle(&args, global),
        // Completions are generated before dispatch
        Command::Completions(_) => Ok(()),
    }
}

/// Load settings from `--config`, the default file, and the environment.
pub(crate) fn load_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let settings = blockswitch_config::load_settings(global.config.as_deref())?;
    tracing::debug!(
        controller = settings.controller_url.as_deref().unwrap_or("<unset>"),
        clients = settings.clients.len(),
        "settings loaded"
    );
    Ok(settings)
}
