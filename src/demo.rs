use std::sync::mpsc;
use std::thread;

use uuid::Uuid;
use zkp_socialist_millionaire::smp::{Link, Session, SessionContext, SmpMessage};

fn party(
    name: &'static str,
    ctx: SessionContext,
    secret: String,
    outbound: mpsc::Sender<SmpMessage>,
    inbox: mpsc::Receiver<SmpMessage>,
    initiator: bool,
) -> thread::JoinHandle<Option<bool>> {
    thread::spawn(move || {
        let mut link = Link::new(Session::new(&ctx, &secret), outbound);
        if initiator {
            link.initiate().ok()?;
        }

        let mut verdict = None;
        // the inbox drains until the peer hangs up
        for msg in inbox {
            match link.dispatch(msg) {
                Ok(Some(matched)) => {
                    verdict = Some(matched);
                    if initiator {
                        return verdict;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    eprintln!("{name}: {err}");
                    return None;
                }
            }
        }
        verdict
    })
}

fn run_exchange(
    alice_secret: &str,
    bob_secret: &str,
) -> Result<(Option<bool>, Option<bool>), Box<dyn std::error::Error>> {
    let ctx = SessionContext {
        version: "1".into(),
        initiator_fingerprint: "3C88DF9F13A3C151".into(),
        responder_fingerprint: "A51B9CFC6E781B75".into(),
        session_id: Uuid::new_v4().to_string(),
    };

    let (to_bob, bob_inbox) = mpsc::channel();
    let (to_alice, alice_inbox) = mpsc::channel();

    let alice = party(
        "alice",
        ctx.clone(),
        alice_secret.to_string(),
        to_bob,
        alice_inbox,
        true,
    );
    let bob = party("bob", ctx, bob_secret.to_string(), to_alice, bob_inbox, false);

    let alice_verdict = alice.join().map_err(|_| "alice thread panicked")?;
    let bob_verdict = bob.join().map_err(|_| "bob thread panicked")?;
    Ok((alice_verdict, bob_verdict))
}

fn describe(verdict: Option<bool>) -> &'static str {
    match verdict {
        Some(true) => "secrets match",
        Some(false) => "secrets differ",
        None => "no verdict",
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Socialist millionaire protocol, two parties over local channels");

    println!("\nBoth parties know \"correct horse\":");
    let (alice, bob) = run_exchange("correct horse", "correct horse")?;
    println!("  alice: {}", describe(alice));
    println!("  bob:   {}", describe(bob));

    println!("\nBob knows \"wrong horse\" instead:");
    let (alice, bob) = run_exchange("correct horse", "wrong horse")?;
    println!("  alice: {}", describe(alice));
    println!("  bob:   {}", describe(bob));

    Ok(())
}
