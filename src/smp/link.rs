//! Channel-based delivery: a session wired to an outbound sender.

use std::sync::mpsc::Sender;

use tracing::warn;

use crate::smp::error::{SmpError, SmpResult};
use crate::smp::message::SmpMessage;
use crate::smp::session::{Session, Step};

/// A session paired with the channel its outbound messages travel on.
///
/// [`Link::dispatch`] enforces the delivery contract mechanically: at most
/// one outbound message per accepted inbound one, and an abort on every
/// protocol error so both sides re-synchronize. A disconnected channel is
/// [`SmpError::NoDeliveryTarget`], an integration error rather than a
/// protocol event.
pub struct Link {
    session: Session,
    outbound: Sender<SmpMessage>,
}

impl Link {
    pub fn new(session: Session, outbound: Sender<SmpMessage>) -> Self {
        Self { session, outbound }
    }

    /// The wrapped session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Start an attempt as the initiator.
    pub fn initiate(&mut self) -> SmpResult<()> {
        let msg = self.session.initiate();
        self.send(msg)
    }

    /// Abandon the current attempt and tell the peer.
    pub fn abort(&mut self) -> SmpResult<()> {
        let msg = self.session.abort();
        self.send(msg)
    }

    /// Process one inbound message, forwarding any reply to the peer.
    ///
    /// Returns `Ok(Some(matched))` when this message completed the attempt,
    /// `Ok(None)` while the exchange is still in flight or the peer
    /// aborted.
    pub fn dispatch(&mut self, msg: SmpMessage) -> SmpResult<Option<bool>> {
        match self.session.receive(msg) {
            Ok(Step::Reply(reply)) => {
                self.send(reply)?;
                Ok(None)
            }
            Ok(Step::Verdict { matched, reply }) => {
                if let Some(reply) = reply {
                    self.send(reply)?;
                }
                Ok(Some(matched))
            }
            Ok(Step::Aborted) => Ok(None),
            Err(err) => {
                // the session already reset; re-synchronize the peer
                warn!(%err, "protocol error, sending abort");
                self.send(SmpMessage::Abort)?;
                Err(err)
            }
        }
    }

    fn send(&self, msg: SmpMessage) -> SmpResult<()> {
        self.outbound
            .send(msg)
            .map_err(|_| SmpError::NoDeliveryTarget)
    }
}
