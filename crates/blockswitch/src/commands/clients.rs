//! `clients`: list the controller's known clients.

use blockswitch_core::{ClientService, KnownClient, LegacyClientService, MacAddress};
use tabled::Tabled;

use crate::cli::{ClientsArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ClientRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Record ID")]
    record_id: String,
    #[tabled(rename = "Blocked")]
    blocked: String,
    #[tabled(rename = "Configured")]
    configured: String,
}

fn yes_no(flag: bool) -> String {
    if flag { "yes".into() } else { "no".into() }
}

/// Keep configured clients unless `all` is set, sorted by MAC.
fn select(mut known: Vec<KnownClient>, configured: &[MacAddress], all: bool) -> Vec<KnownClient> {
    if !all {
        known.retain(|c| configured.contains(&c.mac));
    }
    known.sort_by(|a, b| a.mac.cmp(&b.mac));
    known
}

pub async fn handle(args: ClientsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let configured = settings.platform_config()?.desired_clients();
    let service = LegacyClientService::new(settings.controller_config()?);

    service.authenticate().await?;
    let known = service.known_clients().await;
    if let Err(e) = service.logout().await {
        tracing::warn!(error = %e, "logout failed (non-fatal)");
    }
    let clients = select(known?, &configured, args.all);

    let out = output::render_list(
        global.output,
        &clients,
        |c| ClientRow {
            mac: c.mac.to_string(),
            name: c.display_name().to_owned(),
            record_id: c.record_id.clone(),
            blocked: yes_no(c.blocked),
            configured: yes_no(configured.contains(&c.mac)),
        },
        |c| c.mac.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
