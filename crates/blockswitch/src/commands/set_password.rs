//! `set-password`: store the controller password in the system keyring.

use secrecy::SecretString;

use crate::cli::{GlobalOpts, SetPasswordArgs};
use crate::error::CliError;

pub fn handle(args: &SetPasswordArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let username = match &args.username {
        Some(name) => name.clone(),
        None => super::load_settings(global)?
            .username
            .ok_or_else(|| CliError::MissingField {
                field: "username".into(),
                path: blockswitch_config::config_path().display().to_string(),
            })?,
    };

    let password = rpassword::prompt_password(format!("Password for {username}: "))?;
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "must not be empty".into(),
        });
    }

    blockswitch_config::store_password(&username, &SecretString::from(password))?;
    if !global.quiet {
        eprintln!("Password for {username} stored in the system keyring");
    }
    Ok(())
}
