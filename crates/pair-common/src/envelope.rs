//! PAIR JSON envelope decoding and encoding.
//!
//! Every message on the wire is a JSON object carrying a `type`
//! discriminant plus the fields of that variant. Decoding happens in two
//! steps: the discriminant is read first, then the object is decoded into
//! the typed fields for that variant and every required field is checked
//! for presence. An empty string counts as absent.

use crate::types::{tag, PeerId};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Whether a session description is an offer or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpKind {
    /// `type: "offer"`
    Offer,
    /// `type: "answer"`
    Answer,
}

impl SdpKind {
    /// Returns the wire tag for this kind.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Offer => tag::OFFER,
            Self::Answer => tag::ANSWER,
        }
    }
}

/// A decoded PAIR protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Binds the sending connection to `peer_id`.
    Register {
        /// Identifier the sender wants to be reachable under.
        peer_id: PeerId,
    },
    /// Connection negotiation message.
    OfferOrAnswer {
        /// Offer or answer.
        kind: SdpKind,
        /// Claimed sender. Not checked against the sending connection.
        from: PeerId,
        /// Recipient.
        to: PeerId,
        /// Session description, relayed untouched.
        sdp: String,
    },
    /// Opaque relay message.
    Forward {
        /// Claimed sender. Not checked against the sending connection.
        from: PeerId,
        /// Recipient.
        to: PeerId,
        /// Payload, relayed untouched.
        data: String,
    },
    /// A message whose `type` is not part of the protocol.
    Unknown {
        /// The unrecognized `type` value.
        kind: String,
    },
}

/// Errors that can occur while decoding an envelope.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The input was not a JSON object or a field had the wrong JSON type.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// The `type` discriminant was absent, empty or not a string.
    #[error("no type field in envelope")]
    MissingType,
    /// A required field was absent or empty.
    #[error("no {field} field in {kind} envelope")]
    MissingField {
        /// Wire tag of the envelope being decoded.
        kind: &'static str,
        /// Name of the missing field as it appears on the wire.
        field: &'static str,
    },
}

#[derive(Deserialize)]
struct RegisterFields {
    #[serde(rename = "peerID", default)]
    peer_id: Option<String>,
}

#[derive(Deserialize)]
struct SessionFields {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    sdp: Option<String>,
}

#[derive(Deserialize)]
struct ForwardFields {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

/// Outbound wire shape. Field order here is the order on the wire.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Wire<'a> {
    Register {
        #[serde(rename = "peerID")]
        peer_id: &'a str,
    },
    Offer {
        from: &'a str,
        to: &'a str,
        sdp: &'a str,
    },
    Answer {
        from: &'a str,
        to: &'a str,
        sdp: &'a str,
    },
    Forward {
        from: &'a str,
        to: &'a str,
        data: &'a str,
    },
}

fn required(
    kind: &'static str,
    field: &'static str,
    value: Option<String>,
) -> Result<String, DecodeError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DecodeError::MissingField { kind, field }),
    }
}

fn required_peer(
    kind: &'static str,
    field: &'static str,
    value: Option<String>,
) -> Result<PeerId, DecodeError> {
    PeerId::new(required(kind, field, value)?).ok_or(DecodeError::MissingField { kind, field })
}

impl Envelope {
    /// Creates a `Register` envelope.
    #[must_use]
    pub fn register(peer_id: PeerId) -> Self {
        Self::Register { peer_id }
    }

    /// Creates an offer.
    #[must_use]
    pub fn offer(from: PeerId, to: PeerId, sdp: impl Into<String>) -> Self {
        Self::OfferOrAnswer {
            kind: SdpKind::Offer,
            from,
            to,
            sdp: sdp.into(),
        }
    }

    /// Creates an answer.
    #[must_use]
    pub fn answer(from: PeerId, to: PeerId, sdp: impl Into<String>) -> Self {
        Self::OfferOrAnswer {
            kind: SdpKind::Answer,
            from,
            to,
            sdp: sdp.into(),
        }
    }

    /// Creates a `Forward` envelope.
    #[must_use]
    pub fn forward(from: PeerId, to: PeerId, data: impl Into<String>) -> Self {
        Self::Forward {
            from,
            to,
            data: data.into(),
        }
    }

    /// Decodes one envelope from raw message bytes.
    ///
    /// Decoding is all-or-nothing: either every required field is present
    /// and non-empty, or an error is returned. A well-formed object whose
    /// `type` is not part of the protocol decodes to [`Envelope::Unknown`].
    /// Fields that do not belong to the variant are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the bytes are not a JSON object, the
    /// `type` is missing, or a required field is missing or empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use pair_common::Envelope;
    /// let env = Envelope::decode(br#"{"type":"register","peerID":"alice"}"#).unwrap();
    /// assert_eq!(env.kind(), "register");
    /// ```
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let object: Map<String, Value> = serde_json::from_slice(data)?;
        Self::from_object(object)
    }

    /// Decodes one envelope from a text message.
    ///
    /// # Errors
    ///
    /// See [`Envelope::decode`].
    pub fn decode_str(text: &str) -> Result<Self, DecodeError> {
        let object: Map<String, Value> = serde_json::from_str(text)?;
        Self::from_object(object)
    }

    fn from_object(object: Map<String, Value>) -> Result<Self, DecodeError> {
        let kind = match object.get("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind.clone(),
            _ => return Err(DecodeError::MissingType),
        };
        let value = Value::Object(object);

        match kind.as_str() {
            tag::REGISTER => {
                let fields: RegisterFields = serde_json::from_value(value)?;
                Ok(Self::Register {
                    peer_id: required_peer(tag::REGISTER, "peerID", fields.peer_id)?,
                })
            }
            tag::OFFER | tag::ANSWER => {
                let kind = if kind == tag::OFFER {
                    SdpKind::Offer
                } else {
                    SdpKind::Answer
                };
                let wire_tag = kind.tag();
                let fields: SessionFields = serde_json::from_value(value)?;
                Ok(Self::OfferOrAnswer {
                    kind,
                    from: required_peer(wire_tag, "from", fields.from)?,
                    to: required_peer(wire_tag, "to", fields.to)?,
                    sdp: required(wire_tag, "sdp", fields.sdp)?,
                })
            }
            tag::FORWARD => {
                let fields: ForwardFields = serde_json::from_value(value)?;
                Ok(Self::Forward {
                    from: required_peer(tag::FORWARD, "from", fields.from)?,
                    to: required_peer(tag::FORWARD, "to", fields.to)?,
                    data: required(tag::FORWARD, "data", fields.data)?,
                })
            }
            _ => Ok(Self::Unknown { kind }),
        }
    }

    /// Encodes this envelope as a JSON text message.
    ///
    /// The output always starts with the `type` field, followed by the
    /// variant's fields.
    ///
    /// # Errors
    ///
    /// Returns an error only if JSON serialization itself fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use pair_common::{Envelope, PeerId};
    /// let env = Envelope::register(PeerId::new("alice").unwrap());
    /// assert_eq!(env.encode().unwrap(), r#"{"type":"register","peerID":"alice"}"#);
    /// ```
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns the wire `type` of this envelope.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Register { .. } => tag::REGISTER,
            Self::OfferOrAnswer { kind, .. } => kind.tag(),
            Self::Forward { .. } => tag::FORWARD,
            Self::Unknown { kind } => kind,
        }
    }

    /// Returns the addressed peer for relayable envelopes.
    #[must_use]
    pub const fn recipient(&self) -> Option<&PeerId> {
        match self {
            Self::OfferOrAnswer { to, .. } | Self::Forward { to, .. } => Some(to),
            Self::Register { .. } | Self::Unknown { .. } => None,
        }
    }

    /// Returns the claimed sender for relayable envelopes.
    #[must_use]
    pub const fn sender(&self) -> Option<&PeerId> {
        match self {
            Self::OfferOrAnswer { from, .. } | Self::Forward { from, .. } => Some(from),
            Self::Register { .. } | Self::Unknown { .. } => None,
        }
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Register { peer_id } => Wire::Register {
                peer_id: peer_id.as_str(),
            },
            Self::OfferOrAnswer {
                kind: SdpKind::Offer,
                from,
                to,
                sdp,
            } => Wire::Offer {
                from: from.as_str(),
                to: to.as_str(),
                sdp,
            },
            Self::OfferOrAnswer {
                kind: SdpKind::Answer,
                from,
                to,
                sdp,
            } => Wire::Answer {
                from: from.as_str(),
                to: to.as_str(),
                sdp,
            },
            Self::Forward { from, to, data } => Wire::Forward {
                from: from.as_str(),
                to: to.as_str(),
                data,
            },
            Self::Unknown { kind } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", kind)?;
                return map.end();
            }
        };
        wire.serialize(serializer)
    }
}
