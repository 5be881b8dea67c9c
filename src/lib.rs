//! Mutual authentication of a shared secret without revealing it.
//!
//! An implementation of the socialist millionaire protocol as used by
//! off-the-record messaging: two parties each hold a secret and learn
//! exactly one bit, whether the secrets match, through a four-message
//! zero-knowledge exchange over the 1536-bit MODP group of RFC 3526.
//! Neither party learns anything else about the other's secret, and an
//! eavesdropper learns nothing at all.
//!
//! ```
//! use zkp_socialist_millionaire::smp::{Session, SessionContext, Step};
//!
//! let ctx = SessionContext {
//!     version: "1".into(),
//!     initiator_fingerprint: "alice".into(),
//!     responder_fingerprint: "bob".into(),
//!     session_id: "ssid".into(),
//! };
//! let mut alice = Session::new(&ctx, "correct horse");
//! let mut bob = Session::new(&ctx, "correct horse");
//!
//! let m2 = alice.initiate();
//! let Ok(Step::Reply(m3)) = bob.receive(m2) else { unreachable!() };
//! let Ok(Step::Reply(m4)) = alice.receive(m3) else { unreachable!() };
//! let Ok(Step::Verdict { matched: bob_sees, reply: Some(m5) }) = bob.receive(m4) else {
//!     unreachable!()
//! };
//! let Ok(Step::Verdict { matched: alice_sees, reply: None }) = alice.receive(m5) else {
//!     unreachable!()
//! };
//! assert!(alice_sees && bob_sees);
//! ```

pub mod smp;
