// ── Host characteristic requests ──
//
// The host reads and writes a switch's "on" characteristic by sending a
// request envelope; the engine replies exactly once through the envelope's
// oneshot channel.

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::CoreError;

/// A read or write of one accessory's switch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicRequest {
    /// Refresh from the controller and return the block state.
    Get { uuid: Uuid },
    /// Block (`on = true`) or unblock the client.
    Set { uuid: Uuid, on: bool },
}

impl CharacteristicRequest {
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Get { uuid } | Self::Set { uuid, .. } => *uuid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicResponse {
    /// Current block state, answering a `Get`.
    Value(bool),
    /// The controller accepted a `Set`.
    Ack,
}

/// A request plus the channel its reply goes to.
#[derive(Debug)]
pub struct RequestEnvelope {
    pub request: CharacteristicRequest,
    pub response_tx: oneshot::Sender<Result<CharacteristicResponse, CoreError>>,
}

impl RequestEnvelope {
    pub fn new(
        request: CharacteristicRequest,
    ) -> (
        Self,
        oneshot::Receiver<Result<CharacteristicResponse, CoreError>>,
    ) {
        let (response_tx, rx) = oneshot::channel();
        (
            Self {
                request,
                response_tx,
            },
            rx,
        )
    }
}
