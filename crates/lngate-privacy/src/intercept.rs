//! Host-framework interception types and session routing.
//!
//! The interceptor host delivers every RPC message crossing the
//! gateway as an [`InterceptionRequest`] and applies the returned
//! [`InterceptFeedback`]. Messages are attributed to a session by
//! decoding the storage id embedded in the caller's macaroon
//! identifier; without a macaroon no rewrite can be routed and the
//! interception is refused.

use prost::Message;

use lngate_types::{GateError, Result, SessionId};

use crate::lnrpc;

// ---------------------------------------------------------------------------
// InterceptType
// ---------------------------------------------------------------------------

/// Which direction of an RPC a message belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterceptType {
    /// Client-to-node message, observed before the node sees it.
    Request,
    /// Node-to-client message, observed before the client sees it.
    Response,
    /// Stream establishment probe; carries no rewritable payload.
    StreamAuth,
}

// ---------------------------------------------------------------------------
// Macaroon
// ---------------------------------------------------------------------------

/// The caller's macaroon as parsed by the host framework.
///
/// Only the identifier is consumed here; caveat verification happened
/// upstream.
#[derive(Clone, Debug)]
pub struct Macaroon {
    /// Raw macaroon identifier: one format version byte followed by a
    /// serialized [`lnrpc::MacaroonId`].
    pub identifier: Vec<u8>,
}

// ---------------------------------------------------------------------------
// InterceptionRequest / InterceptFeedback
// ---------------------------------------------------------------------------

/// One message delivered by the interceptor host.
#[derive(Clone, Debug)]
pub struct InterceptionRequest {
    /// Direction of the intercepted message.
    pub request_type: InterceptType,
    /// The caller's parsed macaroon, if one was presented.
    pub macaroon: Option<Macaroon>,
    /// The caller's macaroon in serialized form.
    pub raw_macaroon: Vec<u8>,
    /// Full URI of the intercepted RPC.
    pub full_uri: String,
    /// The serialized protocol message.
    pub proto_serialized: Vec<u8>,
    /// Fully qualified protocol type name of the message.
    pub proto_type_name: String,
}

/// The interceptor's verdict on one message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InterceptFeedback {
    /// Whether the host must substitute the message.
    pub replace_response: bool,
    /// Replacement message bytes; meaningful only when
    /// `replace_response` is set.
    pub replacement_serialized: Vec<u8>,
}

impl InterceptFeedback {
    /// Feedback that forwards the message unmodified.
    pub fn pass_through() -> Self {
        Self {
            replace_response: false,
            replacement_serialized: Vec::new(),
        }
    }

    /// Feedback that substitutes the message with `bytes`.
    pub fn replacement(bytes: Vec<u8>) -> Self {
        Self {
            replace_response: true,
            replacement_serialized: bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// Session routing
// ---------------------------------------------------------------------------

/// Derives the session id from a macaroon's identifier.
///
/// The identifier carries one version byte followed by a serialized
/// [`lnrpc::MacaroonId`]; its storage id (1–32 bytes) is zero-padded
/// into the 32-byte session id.
///
/// # Errors
///
/// Returns [`GateError::InvalidSession`] if the identifier cannot be
/// decoded or the storage id has an unusable length.
pub fn session_id_from_macaroon(macaroon: &Macaroon) -> Result<SessionId> {
    if macaroon.identifier.len() < 2 {
        return Err(GateError::InvalidSession {
            reason: "macaroon identifier too short".into(),
        });
    }

    let decoded = lnrpc::MacaroonId::decode(&macaroon.identifier[1..]).map_err(|e| {
        GateError::InvalidSession {
            reason: format!("failed to decode macaroon identifier: {e}"),
        }
    })?;

    if decoded.storage_id.is_empty() || decoded.storage_id.len() > SessionId::LEN {
        return Err(GateError::InvalidSession {
            reason: format!(
                "macaroon storage id must be 1 to {} bytes, got {}",
                SessionId::LEN,
                decoded.storage_id.len(),
            ),
        });
    }

    let mut bytes = [0u8; SessionId::LEN];
    bytes[..decoded.storage_id.len()].copy_from_slice(&decoded.storage_id);
    Ok(SessionId::new(bytes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn macaroon_with_storage_id(storage_id: &[u8]) -> Macaroon {
        let id = lnrpc::MacaroonId {
            nonce: Vec::new(),
            storage_id: storage_id.to_vec(),
        };
        let mut identifier = vec![2u8];
        identifier.extend_from_slice(&id.encode_to_vec());
        Macaroon { identifier }
    }

    #[test]
    fn storage_id_is_zero_padded() -> Result<()> {
        let session = session_id_from_macaroon(&macaroon_with_storage_id(b"123"))?;

        let mut expected = [0u8; 32];
        expected[..3].copy_from_slice(b"123");
        assert_eq!(session, SessionId::new(expected));
        Ok(())
    }

    #[test]
    fn full_length_storage_id_is_used_verbatim() -> Result<()> {
        let session = session_id_from_macaroon(&macaroon_with_storage_id(&[7u8; 32]))?;
        assert_eq!(session, SessionId::new([7u8; 32]));
        Ok(())
    }

    #[test]
    fn empty_storage_id_is_rejected() {
        let result = session_id_from_macaroon(&macaroon_with_storage_id(b""));
        assert!(matches!(result, Err(GateError::InvalidSession { .. })));
    }

    #[test]
    fn oversized_storage_id_is_rejected() {
        let result = session_id_from_macaroon(&macaroon_with_storage_id(&[1u8; 33]));
        assert!(matches!(result, Err(GateError::InvalidSession { .. })));
    }

    #[test]
    fn short_identifier_is_rejected() {
        let result = session_id_from_macaroon(&Macaroon {
            identifier: vec![2u8],
        });
        assert!(matches!(result, Err(GateError::InvalidSession { .. })));
    }

    #[test]
    fn garbage_identifier_is_rejected() {
        let result = session_id_from_macaroon(&Macaroon {
            identifier: vec![2u8, 0xFF, 0xFF, 0xFF],
        });
        assert!(matches!(result, Err(GateError::InvalidSession { .. })));
    }
}
