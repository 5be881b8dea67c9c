//! The SMP state machine.
//!
//! One [`Session`] per authentication attempt per party. The session owns
//! all ephemeral secrets for the attempt; every terminal transition, abort,
//! and protocol error re-randomizes them, so nothing carries over between
//! attempts and the machine is immediately reusable.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::smp::crypto::{self, group, random_exponent};
use crate::smp::error::{SmpError, SmpResult};
use crate::smp::message::SmpMessage;

/// Protocol phase: which message the session will accept next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmpState {
    /// Awaiting the initiator's opening commitments (responder side, initial).
    Expect1,
    /// Awaiting the responder's generators and commitments (initiator side).
    Expect2,
    /// Awaiting the initiator's p/q pair (responder side).
    Expect3,
    /// Awaiting the responder's rendezvous value (initiator side).
    Expect4,
}

impl SmpState {
    /// The state a session must be in to accept a message of the given
    /// wire type.
    fn expecting(message_type: u8) -> Option<SmpState> {
        match message_type {
            2 => Some(Self::Expect1),
            3 => Some(Self::Expect2),
            4 => Some(Self::Expect3),
            5 => Some(Self::Expect4),
            _ => None,
        }
    }
}

/// Values binding a session to its host-protocol context. They are mixed
/// into the derived secret once at construction and never consulted again.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub version: String,
    pub initiator_fingerprint: String,
    pub responder_fingerprint: String,
    pub session_id: String,
}

fn derive_secret(ctx: &SessionContext, user_secret: &str) -> BigUint {
    let mut hasher = Sha256::new();
    for part in [
        ctx.version.as_str(),
        ctx.initiator_fingerprint.as_str(),
        ctx.responder_fingerprint.as_str(),
        ctx.session_id.as_str(),
        user_secret,
    ] {
        hasher.update((part.len() as u32).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    BigUint::from_bytes_be(&hasher.finalize())
}

/// Outcome of feeding one inbound message to [`Session::receive`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Protocol continues; deliver this to the peer.
    Reply(SmpMessage),
    /// Terminal comparison reached. `reply` carries the final message on
    /// the responder side and is `None` on the initiator side. The session
    /// has reset and can run a fresh attempt.
    Verdict {
        matched: bool,
        reply: Option<SmpMessage>,
    },
    /// The peer abandoned the attempt; nothing to send.
    Aborted,
}

/// Per-attempt protocol state for one party.
pub struct Session {
    secret: BigUint,
    a2: BigUint,
    a3: BigUint,
    g2: Option<BigUint>,
    g3: Option<BigUint>,
    p: Option<BigUint>,
    q: Option<BigUint>,
    r: Option<BigUint>,
    c2: Option<BigUint>,
    c3: Option<BigUint>,
    d2: Option<BigUint>,
    d3: Option<BigUint>,
    // the responder's p, retained from its type-3 message for the final
    // comparison; the type-5 message carries only r
    peer_p: Option<BigUint>,
    state: SmpState,
}

impl Session {
    /// Build a session from the user secret and its binding context.
    pub fn new(ctx: &SessionContext, user_secret: &str) -> Self {
        Self {
            secret: derive_secret(ctx, user_secret),
            a2: random_exponent(),
            a3: random_exponent(),
            g2: None,
            g3: None,
            p: None,
            q: None,
            r: None,
            c2: None,
            c3: None,
            d2: None,
            d3: None,
            peer_p: None,
            state: SmpState::Expect1,
        }
    }

    /// Current protocol phase.
    pub fn state(&self) -> SmpState {
        self.state
    }

    /// Whether an attempt is in flight: true from the first message of an
    /// exchange until a verdict, an abort, or a protocol error resets the
    /// session.
    pub fn in_progress(&self) -> bool {
        self.state != SmpState::Expect1
            || self.g2.is_some()
            || self.g3.is_some()
            || self.p.is_some()
            || self.q.is_some()
            || self.r.is_some()
            || self.c2.is_some()
            || self.c3.is_some()
            || self.d2.is_some()
            || self.d3.is_some()
            || self.peer_p.is_some()
    }

    /// Rearm for a fresh attempt: new private exponents, every derived
    /// field cleared. Runs at every abort, protocol error, and terminal
    /// transition, so no ephemeral secret outlives its single exchange.
    fn reset(&mut self) {
        self.a2 = random_exponent();
        self.a3 = random_exponent();
        self.g2 = None;
        self.g3 = None;
        self.p = None;
        self.q = None;
        self.r = None;
        self.c2 = None;
        self.c3 = None;
        self.d2 = None;
        self.d3 = None;
        self.peer_p = None;
        self.state = SmpState::Expect1;
    }

    /// Start (or restart) an attempt as the initiator.
    ///
    /// Returns the type-2 message to deliver; the session then expects the
    /// peer's type-3 reply.
    pub fn initiate(&mut self) -> SmpMessage {
        self.reset();

        let (g2a, g3a) = self.make_g2s();

        // prove knowledge of the exponents behind g2a and g3a
        let r2 = random_exponent();
        let r3 = random_exponent();
        let c2 = crypto::compute_c(1, &r2);
        let c3 = crypto::compute_c(2, &r3);
        let d2 = crypto::compute_d(&r2, &self.a2, &c2);
        let d3 = crypto::compute_d(&r3, &self.a3, &c3);

        self.c2 = Some(c2.clone());
        self.c3 = Some(c3.clone());
        self.d2 = Some(d2.clone());
        self.d3 = Some(d3.clone());
        self.state = SmpState::Expect2;
        debug!("initiating exchange");

        SmpMessage::Initiate {
            g2a,
            g3a,
            c2,
            c3,
            d2,
            d3,
        }
    }

    /// Abandon the current attempt. Returns the abort message to deliver.
    pub fn abort(&mut self) -> SmpMessage {
        self.reset();
        SmpMessage::Abort
    }

    /// Feed one inbound message to the machine.
    ///
    /// On `UnexpectedState`, `InvalidMessage`, or `ProofVerificationFailed`
    /// the session has already reset when `Err` is returned, and the caller
    /// must deliver an abort (type 6) to the peer so both sides
    /// re-synchronize; the `Link` delivery layer does this automatically.
    pub fn receive(&mut self, msg: SmpMessage) -> SmpResult<Step> {
        if msg == SmpMessage::Abort {
            debug!("peer aborted the attempt");
            self.reset();
            return Ok(Step::Aborted);
        }

        let message_type = msg.message_type();
        match SmpState::expecting(message_type) {
            Some(required) if required == self.state => {}
            _ => {
                let state = self.state;
                warn!(?state, message_type, "message does not match expected state");
                self.reset();
                return Err(SmpError::UnexpectedState {
                    state,
                    message_type,
                });
            }
        }

        if let Err(err) = msg.validate() {
            warn!(%err, "rejecting malformed message");
            self.reset();
            return Err(err);
        }

        match self.handle(msg) {
            Ok(step) => Ok(step),
            Err(err) => {
                warn!(%err, "aborting attempt");
                self.reset();
                Err(err)
            }
        }
    }

    // One state transition. The expected-state table has already been
    // checked; errors here leave the reset to `receive`.
    fn handle(&mut self, msg: SmpMessage) -> SmpResult<Step> {
        let gp = group();
        match (self.state, msg) {
            // responder: the initiator's commitments arrive
            (
                SmpState::Expect1,
                SmpMessage::Initiate {
                    g2a,
                    g3a,
                    c2,
                    c3,
                    d2,
                    d3,
                },
            ) => {
                if !crypto::verify(1, &c2, &d2, &g2a) {
                    return Err(SmpError::ProofVerificationFailed("c2/d2 over g2a"));
                }
                if !crypto::verify(2, &c3, &d3, &g3a) {
                    return Err(SmpError::ProofVerificationFailed("c3/d3 over g3a"));
                }

                let (own_g2a, own_g3a) = self.make_g2s();
                let (g2, g3) = self.compute_gs(&g2a, &g3a);
                let (p, q) = self.compute_pq(&g2, &g3);
                self.state = SmpState::Expect3;
                debug!("opening proofs verified, joint generators derived");

                Ok(Step::Reply(SmpMessage::Reply {
                    g2a: own_g2a,
                    g3a: own_g3a,
                    p,
                    q,
                }))
            }

            // initiator: the responder's halves arrive
            (SmpState::Expect2, SmpMessage::Reply { g2a, g3a, p, q }) => {
                let (g2, g3) = self.compute_gs(&g2a, &g3a);
                let (own_p, own_q) = self.compute_pq(&g2, &g3);
                let r = self.compute_r(&own_q, &q, false)?;
                self.peer_p = Some(p);
                self.state = SmpState::Expect4;

                Ok(Step::Reply(SmpMessage::Exchange {
                    p: own_p,
                    q: own_q,
                    r,
                }))
            }

            // responder: terminal comparison, then hand the initiator its half
            (SmpState::Expect3, SmpMessage::Exchange { p, q, r }) => {
                let (Some(own_p), Some(own_q)) = (self.p.clone(), self.q.clone()) else {
                    return Err(SmpError::UnexpectedState {
                        state: self.state,
                        message_type: 4,
                    });
                };
                let own_r = self.compute_r(&own_q, &q, true)?;
                let rab = self.compute_rab(&r);
                let expected = crypto::div_mod(&p, &own_p, &gp.n)
                    .ok_or_else(|| SmpError::InvalidMessage("p is not invertible".into()))?;
                let matched = rab == expected;
                debug!(matched, "responder comparison complete");
                self.reset();

                Ok(Step::Verdict {
                    matched,
                    reply: Some(SmpMessage::Rendezvous { r: own_r }),
                })
            }

            // initiator: terminal comparison, nothing further to send
            (SmpState::Expect4, SmpMessage::Rendezvous { r }) => {
                let (Some(own_p), Some(peer_p)) = (self.p.clone(), self.peer_p.clone()) else {
                    return Err(SmpError::UnexpectedState {
                        state: self.state,
                        message_type: 5,
                    });
                };
                let rab = self.compute_rab(&r);
                let expected = crypto::div_mod(&own_p, &peer_p, &gp.n)
                    .ok_or_else(|| SmpError::InvalidMessage("p is not invertible".into()))?;
                let matched = rab == expected;
                debug!(matched, "initiator comparison complete");
                self.reset();

                Ok(Step::Verdict {
                    matched,
                    reply: None,
                })
            }

            // state/type agreement was checked in `receive`
            (state, other) => Err(SmpError::UnexpectedState {
                state,
                message_type: other.message_type(),
            }),
        }
    }

    /// This party's public halves `G^a2`, `G^a3`.
    fn make_g2s(&self) -> (BigUint, BigUint) {
        let gp = group();
        (
            gp.g.modpow(&self.a2, &gp.n),
            gp.g.modpow(&self.a3, &gp.n),
        )
    }

    /// Combine the peer's halves with this party's private exponents into
    /// the joint generators, as in a two-party Diffie-Hellman step.
    fn compute_gs(&mut self, peer_g2a: &BigUint, peer_g3a: &BigUint) -> (BigUint, BigUint) {
        let gp = group();
        let g2 = peer_g2a.modpow(&self.a2, &gp.n);
        let g3 = peer_g3a.modpow(&self.a3, &gp.n);
        self.g2 = Some(g2.clone());
        self.g3 = Some(g3.clone());
        (g2, g3)
    }

    /// Commit to the secret under the joint generators with a fresh
    /// exponent: `p = g3^r`, `q = G^r * g2^secret`.
    fn compute_pq(&mut self, g2: &BigUint, g3: &BigUint) -> (BigUint, BigUint) {
        let gp = group();
        let r = random_exponent();
        let p = g3.modpow(&r, &gp.n);
        let q = crypto::mult_mod(
            &gp.g.modpow(&r, &gp.n),
            &g2.modpow(&self.secret, &gp.n),
            &gp.n,
        );
        self.p = Some(p.clone());
        self.q = Some(q.clone());
        (p, q)
    }

    /// Rendezvous half `((q1/q2) mod N)^a3`. The responder inverts the
    /// ratio relative to the initiator so both sides of the final
    /// comparison point the same way.
    fn compute_r(&mut self, own_q: &BigUint, peer_q: &BigUint, inverted: bool) -> SmpResult<BigUint> {
        let gp = group();
        let (q1, q2) = if inverted {
            (peer_q, own_q)
        } else {
            (own_q, peer_q)
        };
        let ratio = crypto::div_mod(q1, q2, &gp.n)
            .ok_or_else(|| SmpError::InvalidMessage("q is not invertible".into()))?;
        let r = ratio.modpow(&self.a3, &gp.n);
        self.r = Some(r.clone());
        Ok(r)
    }

    /// The shared rendezvous value `peer_r^a3`.
    fn compute_rab(&self, peer_r: &BigUint) -> BigUint {
        let gp = group();
        peer_r.modpow(&self.a3, &gp.n)
    }
}
