//! Raw RSA blind-signature arithmetic.
//!
//! The exchange deliberately signs an unpadded integer: the blinding factor
//! supplies the randomization, and conventional signature padding would break
//! the algebraic blind/unblind relationship. Do not add padding here.

use crate::{Error, PollKey, PollPublicKey};
use num_bigint_dig::{BigUint, ModInverse, RandBigInt};
use num_integer::Integer;
use num_traits::One;
use rand::Rng;
use sha2::{Digest, Sha256};

/// SHA-256 of `bytes`, interpreted as a big-endian integer.
pub fn hash_int(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(&Sha256::digest(bytes))
}

/// Draw a blinding factor uniformly from `[2, n-1]`, resampling until it is
/// coprime with the modulus.
pub fn blinding_factor<R: Rng>(rng: &mut R, n: &BigUint) -> BigUint {
    loop {
        let r = rng.gen_biguint_below(n);
        if r > BigUint::one() && r.gcd(n).is_one() {
            return r;
        }
    }
}

/// Blind `h` with the factor `r`: `h * r^e mod n`.
pub fn blind(public: &PollPublicKey, h: &BigUint, r: &BigUint) -> BigUint {
    (h * r.modpow(&public.e, &public.n)) % &public.n
}

/// Sign a blinded value: raw modular exponentiation `blinded^d mod n`.
///
/// The blinded value must be strictly below the modulus.
pub fn sign_blinded(key: &PollKey, blinded: &BigUint) -> Result<BigUint, Error> {
    if *blinded >= key.n {
        return Err(Error::BlindedValueOutOfRange);
    }
    Ok(blinded.modpow(&key.d, &key.n))
}

/// Remove the blinding factor from a blind signature:
/// `blind_signature * r^-1 mod n`.
pub fn unblind(n: &BigUint, blind_signature: &BigUint, r: &BigUint) -> Result<BigUint, Error> {
    let r_inv = r
        .mod_inverse(n)
        .and_then(|inv| inv.to_biguint())
        .ok_or(Error::NonInvertibleBlindingFactor)?;
    Ok((blind_signature * r_inv) % n)
}

/// Check that `signature` certifies the hash `h`: `signature^e mod n == h`.
pub fn verify_unblinded(public: &PollPublicKey, signature: &BigUint, h: &BigUint) -> bool {
    signature.modpow(&public.e, &public.n) == h % &public.n
}
