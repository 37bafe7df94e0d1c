//! Wire protocol between coordinator and workers.
//!
//! Three logical message kinds travel over reliable, ordered per-sender
//! channels. Frames are bincode-encoded; anything that fails to decode is an
//! invalid message, counted and discarded by the receiver.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Worker → coordinator: this pair of live community ids passed local
    /// evaluation. Fire-and-forget; the worker never awaits an outcome.
    Propose { a: u32, b: u32 },
    /// Coordinator → workers: the merge was accepted and applied under the
    /// issued id. Replayed verbatim by every replica.
    Update { a: u32, b: u32, merged: u32 },
    /// Coordinator → workers: stop searching.
    Terminate,
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|err| EngineError::InvalidMessage(format!("encode: {err}")))
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        bincode::deserialize(frame)
            .map_err(|err| EngineError::InvalidMessage(format!("decode: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_survive_the_wire() {
        for msg in [
            Message::Propose { a: 3, b: 17 },
            Message::Update {
                a: 3,
                b: 17,
                merged: 42,
            },
            Message::Terminate,
        ] {
            let frame = msg.encode().unwrap();
            assert_eq!(Message::decode(&frame).unwrap(), msg);
        }
    }

    #[test]
    fn garbage_frames_are_invalid_messages() {
        let err = Message::decode(&[0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMessage(_)));
    }
}
