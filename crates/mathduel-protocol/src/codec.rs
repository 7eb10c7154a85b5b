//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The rest of the workspace only sees the [`Codec`] trait. [`JsonCodec`]
//! is the one the browser client speaks.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because a codec lives inside the shared server
/// state and is used from every connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed, carry an
    /// unknown `type`, or are missing required fields.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use mathduel_protocol::{Codec, Command, JsonCodec, RoomId};
///
/// let codec = JsonCodec;
///
/// let cmd: Command = codec
///     .decode(br#"{"type": "join_room", "room_id": "k3x9qa"}"#)
///     .unwrap();
/// assert_eq!(cmd, Command::JoinRoom { room_id: RoomId::from("k3x9qa") });
///
/// let bytes = codec.encode(&cmd).unwrap();
/// assert_eq!(codec.decode::<Command>(&bytes).unwrap(), cmd);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Command, ServerEvent};

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = JsonCodec.decode::<Command>(b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_encode_event_is_utf8_json() {
        let bytes = JsonCodec
            .encode(&ServerEvent::HeartbeatAck { server_time: 7 })
            .unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text, r#"{"type":"heartbeat_ack","server_time":7}"#);
    }
}
