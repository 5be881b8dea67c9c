//! The SMP message variants and their wire shape.
//!
//! Byte-level framing (armoring, transport) belongs to the host protocol;
//! this module covers the logical field sets and the checks that make a
//! decoded message acceptable to the state machine.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::smp::crypto;
use crate::smp::error::{SmpError, SmpResult};

/// One protocol message, tagged by wire type.
///
/// Wire numbering starts at 2: type 1 is the host protocol's request to
/// begin and never reaches the engine. Messages are transient, produced and
/// consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SmpMessage {
    /// Type 2: opens the exchange with the initiator's public halves and
    /// knowledge proofs for their exponents.
    Initiate {
        g2a: BigUint,
        g3a: BigUint,
        c2: BigUint,
        c3: BigUint,
        d2: BigUint,
        d3: BigUint,
    },
    /// Type 3: the responder's own public halves plus its commitment pair.
    Reply {
        g2a: BigUint,
        g3a: BigUint,
        p: BigUint,
        q: BigUint,
    },
    /// Type 4: the initiator's commitment pair and rendezvous half.
    Exchange {
        p: BigUint,
        q: BigUint,
        r: BigUint,
    },
    /// Type 5: the responder's rendezvous half.
    Rendezvous { r: BigUint },
    /// Type 6: abandon the attempt.
    Abort,
}

impl SmpMessage {
    /// Wire type tag.
    pub fn message_type(&self) -> u8 {
        match self {
            Self::Initiate { .. } => 2,
            Self::Reply { .. } => 3,
            Self::Exchange { .. } => 4,
            Self::Rendezvous { .. } => 5,
            Self::Abort => 6,
        }
    }

    /// Range-check every group element the message carries.
    ///
    /// Hash commitments (`c2`, `c3`) and exponent responses (`d2`, `d3`)
    /// are not group elements and may take any value.
    pub(crate) fn validate(&self) -> SmpResult<()> {
        let elements: Vec<(&str, &BigUint)> = match self {
            Self::Initiate { g2a, g3a, .. } => vec![("g2a", g2a), ("g3a", g3a)],
            Self::Reply { g2a, g3a, p, q } => {
                vec![("g2a", g2a), ("g3a", g3a), ("p", p), ("q", q)]
            }
            Self::Exchange { p, q, r } => vec![("p", p), ("q", q), ("r", r)],
            Self::Rendezvous { r } => vec![("r", r)],
            Self::Abort => vec![],
        };
        for (name, element) in elements {
            if !crypto::valid_element(element) {
                return Err(SmpError::InvalidMessage(format!(
                    "{name} outside the group range"
                )));
            }
        }
        Ok(())
    }
}

/// Flattened wire shape: a numeric `type` and the union of the per-type
/// fields, the way the host transport frames a message before armoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub message_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub g2a: Option<BigUint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub g3a: Option<BigUint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c2: Option<BigUint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c3: Option<BigUint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d2: Option<BigUint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d3: Option<BigUint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<BigUint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<BigUint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r: Option<BigUint>,
}

fn field(value: Option<BigUint>, name: &str) -> SmpResult<BigUint> {
    value.ok_or_else(|| SmpError::InvalidMessage(format!("missing field {name}")))
}

impl WireMessage {
    /// Decode into a typed message, rejecting unrecognized types, missing
    /// fields, and out-of-range values as `InvalidMessage`.
    pub fn into_message(self) -> SmpResult<SmpMessage> {
        let msg = match self.message_type {
            2 => SmpMessage::Initiate {
                g2a: field(self.g2a, "g2a")?,
                g3a: field(self.g3a, "g3a")?,
                c2: field(self.c2, "c2")?,
                c3: field(self.c3, "c3")?,
                d2: field(self.d2, "d2")?,
                d3: field(self.d3, "d3")?,
            },
            3 => SmpMessage::Reply {
                g2a: field(self.g2a, "g2a")?,
                g3a: field(self.g3a, "g3a")?,
                p: field(self.p, "p")?,
                q: field(self.q, "q")?,
            },
            4 => SmpMessage::Exchange {
                p: field(self.p, "p")?,
                q: field(self.q, "q")?,
                r: field(self.r, "r")?,
            },
            5 => SmpMessage::Rendezvous {
                r: field(self.r, "r")?,
            },
            6 => SmpMessage::Abort,
            other => {
                return Err(SmpError::InvalidMessage(format!(
                    "unrecognized message type {other}"
                )));
            }
        };
        msg.validate()?;
        Ok(msg)
    }
}

impl From<SmpMessage> for WireMessage {
    fn from(msg: SmpMessage) -> Self {
        let message_type = msg.message_type();
        let mut wire = WireMessage {
            message_type,
            ..WireMessage::default()
        };
        match msg {
            SmpMessage::Initiate {
                g2a,
                g3a,
                c2,
                c3,
                d2,
                d3,
            } => {
                wire.g2a = Some(g2a);
                wire.g3a = Some(g3a);
                wire.c2 = Some(c2);
                wire.c3 = Some(c3);
                wire.d2 = Some(d2);
                wire.d3 = Some(d3);
            }
            SmpMessage::Reply { g2a, g3a, p, q } => {
                wire.g2a = Some(g2a);
                wire.g3a = Some(g3a);
                wire.p = Some(p);
                wire.q = Some(q);
            }
            SmpMessage::Exchange { p, q, r } => {
                wire.p = Some(p);
                wire.q = Some(q);
                wire.r = Some(r);
            }
            SmpMessage::Rendezvous { r } => {
                wire.r = Some(r);
            }
            SmpMessage::Abort => {}
        }
        wire
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_type_is_invalid() {
        let wire = WireMessage {
            message_type: 9,
            ..WireMessage::default()
        };
        let err = wire.into_message().unwrap_err();
        assert!(matches!(err, SmpError::InvalidMessage(_)));
    }

    #[test]
    fn missing_field_is_invalid() {
        let wire = WireMessage {
            message_type: 4,
            p: Some(BigUint::from(2u32)),
            q: Some(BigUint::from(2u32)),
            ..WireMessage::default()
        };
        let err = wire.into_message().unwrap_err();
        match err {
            SmpError::InvalidMessage(reason) => assert!(reason.contains("r")),
            other => panic!("expected InvalidMessage, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_element_is_invalid() {
        let wire = WireMessage {
            message_type: 5,
            r: Some(BigUint::from(1u32)),
            ..WireMessage::default()
        };
        let err = wire.into_message().unwrap_err();
        assert!(matches!(err, SmpError::InvalidMessage(_)));
    }

    #[test]
    fn abort_needs_no_fields() {
        let wire = WireMessage {
            message_type: 6,
            ..WireMessage::default()
        };
        assert_eq!(wire.into_message().unwrap(), SmpMessage::Abort);
    }

    #[test]
    fn initiate_survives_the_wire() {
        use crate::smp::session::{Session, SessionContext};

        let ctx = SessionContext {
            version: "1".into(),
            initiator_fingerprint: "123".into(),
            responder_fingerprint: "456".into(),
            session_id: "ssid".into(),
        };
        let msg = Session::new(&ctx, "correct horse").initiate();

        let encoded = serde_json::to_string(&WireMessage::from(msg.clone())).unwrap();
        let decoded: WireMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.into_message().unwrap(), msg);
    }
}
