//! Error kinds for the SMP engine.

use thiserror::Error;

use crate::smp::session::SmpState;

/// Protocol and integration errors.
///
/// The protocol kinds (`UnexpectedState`, `InvalidMessage`,
/// `ProofVerificationFailed`) are recoverable only by abandoning the current
/// attempt: the session has already reset to its initial state when one of
/// them is returned, and the peer must be sent an abort (type 6) so both
/// sides re-synchronize. `NoDeliveryTarget` is an integration error and
/// never a protocol event.
#[derive(Debug, Error)]
pub enum SmpError {
    /// Inbound message type does not match the state the machine expects.
    #[error("unexpected type-{message_type} message in state {state:?}")]
    UnexpectedState {
        /// State the session was in when the message arrived.
        state: SmpState,
        /// Wire type of the offending message.
        message_type: u8,
    },

    /// Message has an unrecognized type, a missing field, or a value
    /// outside the group.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A received zero-knowledge proof does not verify. The peer failed to
    /// prove knowledge of a claimed exponent; treated as an authentication
    /// failure, equivalent to an abort.
    #[error("zero-knowledge proof did not verify: {0}")]
    ProofVerificationFailed(&'static str),

    /// There is nowhere to send an outbound message.
    #[error("no delivery target for outbound message")]
    NoDeliveryTarget,
}

/// Result type alias for SMP operations.
pub type SmpResult<T> = Result<T, SmpError>;
