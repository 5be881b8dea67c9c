//! Group parameters, modular helpers, and the Schnorr proof engine.

use std::sync::LazyLock;

use num_bigint::{BigUint, RandBigInt};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

// Diffie-Hellman modulus, group 5 of RFC 3526
const MODP_1536: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA237327FFFFFFFFFFFFFFFF",
);

/// Process-wide group constants: the prime modulus `n`, the generator `g`,
/// and `q = (n-1)/2`, used only as the modulus for proof-response
/// arithmetic.
#[derive(Debug, Clone)]
pub struct GroupParams {
    pub n: BigUint,
    pub g: BigUint,
    pub q: BigUint,
}

impl GroupParams {
    fn modp1536() -> Self {
        let n = BigUint::parse_bytes(MODP_1536.as_bytes(), 16)
            .expect("RFC 3526 modulus constant is valid hex");
        let q = (&n - 1u32) >> 1;
        Self {
            n,
            g: BigUint::from(2u32),
            q,
        }
    }
}

static GROUP: LazyLock<GroupParams> = LazyLock::new(GroupParams::modp1536);

/// The fixed protocol group. Initialized on first use, immutable after.
pub fn group() -> &'static GroupParams {
    &GROUP
}

/// Fresh 1536-bit ephemeral exponent from the OS rng.
pub fn random_exponent() -> BigUint {
    let mut rng = OsRng;
    rng.gen_biguint(1536)
}

/// `a * b mod n`.
pub fn mult_mod(a: &BigUint, b: &BigUint, n: &BigUint) -> BigUint {
    (a * b) % n
}

/// `a - b mod n`, lifting `a` by `n` when the reduced `b` is larger.
pub fn sub_mod(a: &BigUint, b: &BigUint, n: &BigUint) -> BigUint {
    let mut a = a % n;
    let b = b % n;
    if b > a {
        a += n;
    }
    a - b
}

/// `num / den mod n` via the modular inverse. `None` when `den` has no
/// inverse mod `n`.
pub fn div_mod(num: &BigUint, den: &BigUint, n: &BigUint) -> Option<BigUint> {
    den.modinv(n).map(|inv| mult_mod(num, &inv, n))
}

/// Group elements received from the peer must lie in `[2, n-2]`.
pub fn valid_element(e: &BigUint) -> bool {
    let gp = group();
    let two = BigUint::from(2u32);
    *e >= two && *e <= &gp.n - two
}

/// Fiat-Shamir hash: SHA-256 over the proof version tag and one or two
/// group elements. Each element is length-prefixed so that distinct
/// `(version, element...)` tuples cannot collide through concatenation.
pub fn smp_hash(version: u8, e1: &BigUint, e2: Option<&BigUint>) -> BigUint {
    let mut hasher = Sha256::new();
    hasher.update([version]);
    hash_element(&mut hasher, e1);
    if let Some(e2) = e2 {
        hash_element(&mut hasher, e2);
    }
    BigUint::from_bytes_be(&hasher.finalize())
}

fn hash_element(hasher: &mut Sha256, e: &BigUint) {
    let bytes = e.to_bytes_be();
    hasher.update((bytes.len() as u32).to_be_bytes());
    hasher.update(&bytes);
}

/// Commitment binding a proof instance to a fresh random exponent `r`:
/// `c = H(version || G^r mod N)`.
pub fn compute_c(version: u8, r: &BigUint) -> BigUint {
    let gp = group();
    smp_hash(version, &gp.g.modpow(r, &gp.n), None)
}

/// Schnorr response `(r - a*c) mod Q`, proving knowledge of the exponent
/// `a` behind a published `G^a mod N` without revealing it.
pub fn compute_d(r: &BigUint, a: &BigUint, c: &BigUint) -> BigUint {
    let q = &group().q;
    sub_mod(r, &mult_mod(a, c, q), q)
}

/// Verify a `(c, d)` knowledge proof for the exponent behind `ga`.
///
/// If the prover knew `a`, then `G^d * ga^c = G^(r-ac) * G^(ac) = G^r`,
/// reproducing the committed hash input.
pub fn verify(version: u8, c: &BigUint, d: &BigUint, ga: &BigUint) -> bool {
    let gp = group();
    let gd = gp.g.modpow(d, &gp.n);
    let gac = ga.modpow(c, &gp.n);
    *c == smp_hash(version, &mult_mod(&gd, &gac, &gp.n), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_integer::Integer;
    use num_traits::One;

    // Miller-Rabin; a handful of rounds is plenty for checking a fixed,
    // published constant.
    fn is_probably_prime(n: &BigUint, rounds: usize) -> bool {
        if n < &BigUint::from(2u32) {
            return false;
        }
        if n == &BigUint::from(2u32) || n == &BigUint::from(3u32) {
            return true;
        }
        if n.is_even() {
            return false;
        }

        // Write n-1 as d * 2^r
        let mut d = n - 1u32;
        let mut r = 0;
        while d.is_even() {
            d >>= 1;
            r += 1;
        }

        let mut rng = OsRng;

        'witness_loop: for _ in 0..rounds {
            let a = rng.gen_biguint_range(&BigUint::from(2u32), &(n - 1u32));
            let mut x = a.modpow(&d, n);

            if x.is_one() || x == n - 1u32 {
                continue 'witness_loop;
            }

            for _ in 0..r - 1 {
                x = x.modpow(&BigUint::from(2u32), n);
                if x == n - 1u32 {
                    continue 'witness_loop;
                }
            }
            return false;
        }
        true
    }

    #[test]
    fn group_constants_are_sound() {
        let gp = group();
        assert_eq!(gp.g, BigUint::from(2u32));
        assert_eq!(&gp.q << 1, &gp.n - 1u32);
        assert_eq!(gp.n.bits(), 1536);
        assert!(is_probably_prime(&gp.n, 8));
        assert!(is_probably_prime(&gp.q, 8));
        // 2 is a quadratic residue mod n (n = 7 mod 8), so it generates
        // the subgroup of order q
        assert!(gp.g.modpow(&gp.q, &gp.n).is_one());
    }

    #[test]
    fn sub_mod_wraps_below_zero() {
        let n = BigUint::from(7u32);
        assert_eq!(
            sub_mod(&BigUint::from(2u32), &BigUint::from(5u32), &n),
            BigUint::from(4u32)
        );
        assert_eq!(
            sub_mod(&BigUint::from(5u32), &BigUint::from(2u32), &n),
            BigUint::from(3u32)
        );
        // operands above n reduce first
        assert_eq!(
            sub_mod(&BigUint::from(9u32), &BigUint::from(15u32), &n),
            BigUint::from(1u32)
        );
    }

    #[test]
    fn div_mod_undoes_mult_mod() {
        let gp = group();
        let a = random_exponent() % &gp.n;
        let b = random_exponent() % &gp.n;
        let product = mult_mod(&a, &b, &gp.n);
        assert_eq!(div_mod(&product, &b, &gp.n), Some(a));
    }

    #[test]
    fn div_mod_rejects_noninvertible_denominator() {
        let gp = group();
        let num = BigUint::from(3u32);
        assert_eq!(div_mod(&num, &BigUint::from(0u32), &gp.n), None);
        assert_eq!(div_mod(&num, &gp.n, &gp.n), None);
    }

    #[test]
    fn element_range_check() {
        let gp = group();
        assert!(valid_element(&BigUint::from(2u32)));
        assert!(valid_element(&(&gp.n - 2u32)));
        assert!(!valid_element(&BigUint::from(0u32)));
        assert!(!valid_element(&BigUint::from(1u32)));
        assert!(!valid_element(&(&gp.n - 1u32)));
        assert!(!valid_element(&gp.n));
    }

    #[test]
    fn honest_proof_verifies() {
        let gp = group();
        let a = random_exponent();
        let ga = gp.g.modpow(&a, &gp.n);

        let r = random_exponent();
        let c = compute_c(1, &r);
        let d = compute_d(&r, &a, &c);

        assert!(verify(1, &c, &d, &ga));
        // version tags domain-separate proof instances
        assert!(!verify(2, &c, &d, &ga));
    }

    #[test]
    fn forged_responses_do_not_verify() {
        let gp = group();
        let a = random_exponent();
        let ga = gp.g.modpow(&a, &gp.n);

        let r = random_exponent();
        let c = compute_c(1, &r);

        // fuzz d while holding c fixed
        for _ in 0..16 {
            let forged = random_exponent() % &gp.q;
            assert!(!verify(1, &c, &forged, &ga));
        }
    }

    #[test]
    fn hash_length_prefix_disambiguates() {
        // (0x01, 0x0203) and (0x0102, 0x03) concatenate identically; the
        // length prefix must keep them apart
        let left = smp_hash(1, &BigUint::from(0x01u32), Some(&BigUint::from(0x0203u32)));
        let right = smp_hash(1, &BigUint::from(0x0102u32), Some(&BigUint::from(0x03u32)));
        assert_ne!(left, right);

        // and the single-element form differs from the pair form
        let single = smp_hash(1, &BigUint::from(0x01u32), None);
        assert_ne!(single, left);
    }
}
