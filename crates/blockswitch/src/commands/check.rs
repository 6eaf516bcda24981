//! `check`: validate the configuration, optionally by logging in.

use blockswitch_core::{ClientService, LegacyClientService};
use tracing::info;

use crate::cli::{CheckArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: CheckArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let controller = settings.controller_config()?;
    let platform = settings.platform_config()?;

    output::print_output(&settings.to_toml_redacted()?, global.quiet);

    if args.connect {
        let service = LegacyClientService::new(controller);
        service.authenticate().await?;
        info!(url = %service.config().url, "login succeeded");
        let known = service.known_clients().await?;
        let configured = platform
            .desired_clients()
            .iter()
            .filter(|mac| known.iter().any(|c| &c.mac == *mac))
            .count();
        service.logout().await?;
        if !global.quiet {
            eprintln!(
                "Connected: {configured} of {} configured clients are known to the controller",
                platform.desired_clients().len()
            );
        }
    }
    Ok(())
}
