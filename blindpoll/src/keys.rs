use crate::Error;
use num_bigint_dig::{BigUint, ModInverse};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::RsaPrivateKey;

/// Key size for poll signing keys.
pub const POLL_KEY_BITS: usize = 2048;

/// RSA key material for a signed poll.
///
/// Generated exactly once, at poll creation, and only for polls that require
/// signed voting. The private half (`d` and the CRT parameters) is stored
/// with the poll and never returned by any read endpoint; public projections
/// expose only `{n, e}`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PollKey {
    #[serde(with = "crate::biguint_dec")]
    pub n: BigUint,
    #[serde(with = "crate::biguint_dec")]
    pub e: BigUint,
    #[serde(with = "crate::biguint_dec")]
    pub d: BigUint,
    #[serde(with = "crate::biguint_dec")]
    pub p: BigUint,
    #[serde(with = "crate::biguint_dec")]
    pub q: BigUint,
    #[serde(with = "crate::biguint_dec")]
    pub dp: BigUint,
    #[serde(with = "crate::biguint_dec")]
    pub dq: BigUint,
    #[serde(with = "crate::biguint_dec")]
    pub qinv: BigUint,
}

/// The public half of a poll key, safe to hand to voters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PollPublicKey {
    #[serde(with = "crate::biguint_dec")]
    pub n: BigUint,
    #[serde(with = "crate::biguint_dec")]
    pub e: BigUint,
}

impl PollKey {
    /// Generate a fresh poll keypair of the given size.
    pub fn generate(bits: usize) -> Result<Self, Error> {
        let mut rng = rand::rngs::OsRng;
        let key = RsaPrivateKey::new(&mut rng, bits)?;

        let n = key.n().clone();
        let e = key.e().clone();
        let d = key.d().clone();
        let primes = key.primes();
        let p = primes[0].clone();
        let q = primes[1].clone();

        let dp = &d % (&p - 1u32);
        let dq = &d % (&q - 1u32);
        let qinv = (&q)
            .mod_inverse(&p)
            .and_then(|inv| inv.to_biguint())
            .ok_or(Error::KeyGeneration)?;

        Ok(PollKey {
            n,
            e,
            d,
            p,
            q,
            dp,
            dq,
            qinv,
        })
    }

    pub fn public(&self) -> PollPublicKey {
        PollPublicKey {
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;

    #[test]
    fn generated_key_is_consistent() {
        let key = PollKey::generate(512).unwrap();

        assert_eq!(key.n, &key.p * &key.q);
        assert_eq!(key.dp, &key.d % (&key.p - 1u32));
        assert_eq!(key.dq, &key.d % (&key.q - 1u32));
        assert!(((&key.q * &key.qinv) % &key.p).is_one());
    }

    #[test]
    fn public_projection_carries_no_private_material() {
        let key = PollKey::generate(512).unwrap();
        let public = key.public();
        let json = serde_json::to_value(&public).unwrap();

        assert_eq!(json["n"], serde_json::json!(key.n.to_str_radix(10)));
        assert_eq!(json["e"], serde_json::json!(key.e.to_str_radix(10)));
        assert_eq!(json.as_object().unwrap().len(), 2);
    }
}
