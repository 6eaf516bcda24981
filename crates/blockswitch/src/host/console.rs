//! Line-oriented stdin console.
//!
//! Stands in for the bridge's characteristic requests while running in the
//! foreground: `get <mac>`, `set <mac> on|off`, `list`.

use std::io::BufRead;

use tokio::sync::mpsc;
use tracing::debug;

use blockswitch_core::{
    CharacteristicRequest, CharacteristicResponse, MacAddress, Platform, RequestEnvelope,
};

enum ConsoleOutcome {
    Continue,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Get(MacAddress),
    Set(MacAddress, bool),
    List,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command `{0}` (expected get, set, or list)")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("expected on or off, got `{0}`")]
    BadState(String),
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "list" | "ls" => ConsoleCommand::List,
        "get" => {
            let mac = words.next().ok_or(ParseError::Usage("get <mac>"))?;
            ConsoleCommand::Get(MacAddress::new(mac))
        }
        "set" => {
            let (Some(mac), Some(state)) = (words.next(), words.next()) else {
                return Err(ParseError::Usage("set <mac> on|off"));
            };
            let on = match state.to_ascii_lowercase().as_str() {
                "on" | "block" | "true" | "1" => true,
                "off" | "unblock" | "false" | "0" => false,
                other => return Err(ParseError::BadState(other.into())),
            };
            ConsoleCommand::Set(MacAddress::new(mac), on)
        }
        other => return Err(ParseError::UnknownCommand(other.into())),
    };
    Ok(Some(cmd))
}

/// Read stdin on a dedicated thread, forwarding lines to the returned
/// channel. The thread ends at EOF or when the receiver is dropped.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Serve console commands until the input or the request channel closes.
pub async fn run(
    platform: Platform,
    requests: mpsc::Sender<RequestEnvelope>,
    mut input: mpsc::Receiver<String>,
) {
    while let Some(line) = input.recv().await {
        let cmd = match parse_line(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        if let ConsoleOutcome::Closed = execute(&platform, &requests, cmd).await {
            debug!("request channel closed; console stopping");
            return;
        }
    }
    debug!("console input closed");
}

async fn execute(
    platform: &Platform,
    requests: &mpsc::Sender<RequestEnvelope>,
    cmd: ConsoleCommand,
) -> ConsoleOutcome {
    let (mac, request) = match cmd {
        ConsoleCommand::List => {
            for acc in platform.accessories().iter() {
                let state = acc
                    .switch()
                    .map_or("no switch", |s| if s.is_on() { "blocked" } else { "allowed" });
                println!("{}\t{}\t{state}", acc.mac(), acc.display_name());
            }
            return ConsoleOutcome::Continue;
        }
        ConsoleCommand::Get(mac) => (mac, None),
        ConsoleCommand::Set(mac, on) => (mac, Some(on)),
    };

    let Some(uuid) = platform
        .accessories()
        .iter()
        .find(|acc| *acc.mac() == mac)
        .map(|acc| acc.uuid())
    else {
        eprintln!("no accessory for {mac}");
        return ConsoleOutcome::Continue;
    };

    let request = match request {
        None => CharacteristicRequest::Get { uuid },
        Some(on) => CharacteristicRequest::Set { uuid, on },
    };
    let (envelope, reply) = RequestEnvelope::new(request);
    if requests.send(envelope).await.is_err() {
        return ConsoleOutcome::Closed;
    }

    match reply.await {
        Ok(Ok(CharacteristicResponse::Value(on))) => {
            println!("{mac}\t{}", if on { "blocked" } else { "allowed" });
        }
        Ok(Ok(CharacteristicResponse::Ack)) => println!("{mac}\tok"),
        Ok(Err(e)) => eprintln!("{mac}: {e}"),
        Err(_) => return ConsoleOutcome::Closed,
    }
    ConsoleOutcome::Continue
}
