//! The voter's side of the certification exchange.
//!
//! Everything here runs on the voter's device: the voting keypair, the
//! blinding factor and the private key never leave the client.

use crate::{blind, Ballot, BallotMessage, Error, PollPublicKey};
use num_bigint_dig::BigUint;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Key size for ephemeral voting identities.
pub const VOTING_KEY_BITS: usize = 2048;

/// An ephemeral voting identity: a fresh RSA keypair whose public-key hash
/// has been blinded, ready to be certified by the poll's blind signer.
pub struct VotingIdentity {
    voting_key: RsaPrivateKey,
    public: VotingPublicKey,
    blinded_hash: BigUint,
    blinding_factor: BigUint,
}

/// The public half of a voting identity.
///
/// The canonical serialized form (decimal `e` then decimal `n`) is what the
/// certification hash covers; both the client and the verifier hash exactly
/// these bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VotingPublicKey {
    #[serde(with = "crate::biguint_dec")]
    pub e: BigUint,
    #[serde(with = "crate::biguint_dec")]
    pub n: BigUint,
}

impl VotingPublicKey {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap()
    }

    /// `SHA-256(canonical_bytes)` as an integer.
    pub fn hash_int(&self) -> BigUint {
        blind::hash_int(&self.canonical_bytes())
    }
}

impl VotingIdentity {
    /// Generate a fresh voting identity and blind its public-key hash for
    /// the given poll.
    pub fn generate(poll_public: &PollPublicKey) -> Result<Self, Error> {
        Self::generate_with_bits(poll_public, VOTING_KEY_BITS)
    }

    pub fn generate_with_bits(poll_public: &PollPublicKey, bits: usize) -> Result<Self, Error> {
        let mut rng = rand::rngs::OsRng;
        let voting_key = RsaPrivateKey::new(&mut rng, bits)?;
        let public = VotingPublicKey {
            e: voting_key.e().clone(),
            n: voting_key.n().clone(),
        };

        let h = public.hash_int();
        let blinding_factor = blind::blinding_factor(&mut rng, &poll_public.n);
        let blinded_hash = blind::blind(poll_public, &h, &blinding_factor);

        Ok(VotingIdentity {
            voting_key,
            public,
            blinded_hash,
            blinding_factor,
        })
    }

    pub fn public(&self) -> &VotingPublicKey {
        &self.public
    }

    /// The blinded hash to send to the signer, decimal-encoded.
    pub fn blinded_hash(&self) -> String {
        self.blinded_hash.to_str_radix(10)
    }

    /// Unblind the signer's response and verify it against the poll's
    /// public key, producing the durable credential.
    ///
    /// Consumes the identity: on a verification failure the candidate
    /// credential (and the blinding factor) is discarded, never cached.
    pub fn finalize(
        self,
        poll_public: &PollPublicKey,
        blind_signature: &BigUint,
        access_token: String,
    ) -> Result<VoterCredential, Error> {
        let certification = blind::unblind(&poll_public.n, blind_signature, &self.blinding_factor)?;
        if !blind::verify_unblinded(poll_public, &certification, &self.public.hash_int()) {
            return Err(Error::UnblindVerifyFailed);
        }

        Ok(VoterCredential {
            access_token,
            voting_key: self.voting_key,
            certification,
        })
    }
}

/// A certified voting identity, persisted client-side so the voter can sign
/// now and vote later. Losing it forfeits the invite; it cannot be reissued.
#[derive(Serialize, Deserialize, Clone)]
pub struct VoterCredential {
    pub access_token: String,
    pub voting_key: RsaPrivateKey,
    #[serde(with = "crate::biguint_dec")]
    pub certification: BigUint,
}

impl VoterCredential {
    pub fn public(&self) -> VotingPublicKey {
        VotingPublicKey {
            e: self.voting_key.e().clone(),
            n: self.voting_key.n().clone(),
        }
    }

    /// Build a signed ballot for the given options: the message binds the
    /// poll id and the chosen options, and is signed RSA-SHA256 under the
    /// voting key.
    pub fn ballot(&self, poll_id: Uuid, options: Vec<String>) -> Result<Ballot, Error> {
        let message = serde_json::to_string(&BallotMessage {
            id: poll_id,
            options,
        })
        .unwrap();

        let digest = Sha256::digest(message.as_bytes());
        let signature = self
            .voting_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)?;

        Ok(Ballot {
            message,
            message_signature: Some(BigUint::from_bytes_be(&signature).to_str_radix(10)),
            voting_public_key: Some(self.public()),
            certification_signature: Some(self.certification.to_str_radix(10)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{blind, PollKey};

    #[test]
    fn certification_exchange_round_trip() {
        let poll_key = PollKey::generate(512).unwrap();
        let poll_public = poll_key.public();

        let identity = VotingIdentity::generate_with_bits(&poll_public, 512).unwrap();
        let blinded: BigUint = identity.blinded_hash().parse().unwrap();

        let blind_signature = blind::sign_blinded(&poll_key, &blinded).unwrap();
        let credential = identity
            .finalize(&poll_public, &blind_signature, "invite-a".into())
            .unwrap();

        // the certification is a valid plain signature over the key hash
        assert!(blind::verify_unblinded(
            &poll_public,
            &credential.certification,
            &credential.public().hash_int()
        ));
        assert_eq!(credential.access_token, "invite-a");
    }

    #[test]
    fn tampered_blind_signature_is_discarded() {
        let poll_key = PollKey::generate(512).unwrap();
        let poll_public = poll_key.public();

        let identity = VotingIdentity::generate_with_bits(&poll_public, 512).unwrap();
        let blinded: BigUint = identity.blinded_hash().parse().unwrap();
        let forged = blind::sign_blinded(&poll_key, &blinded).unwrap() + 1u32;

        assert!(matches!(
            identity.finalize(&poll_public, &forged, "invite-a".into()),
            Err(Error::UnblindVerifyFailed)
        ));
    }

    #[test]
    fn credential_survives_persistence() {
        let poll_key = PollKey::generate(512).unwrap();
        let poll_public = poll_key.public();

        let identity = VotingIdentity::generate_with_bits(&poll_public, 512).unwrap();
        let blinded: BigUint = identity.blinded_hash().parse().unwrap();
        let blind_signature = blind::sign_blinded(&poll_key, &blinded).unwrap();
        let credential = identity
            .finalize(&poll_public, &blind_signature, "invite-a".into())
            .unwrap();

        let json = serde_json::to_string(&credential).unwrap();
        let restored: VoterCredential = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.access_token, credential.access_token);
        assert_eq!(restored.certification, credential.certification);
        assert_eq!(restored.public(), credential.public());
    }

    #[test]
    fn canonical_bytes_are_stable() {
        let key = VotingPublicKey {
            e: BigUint::from(65537u32),
            n: BigUint::from(3233u32),
        };
        assert_eq!(
            key.canonical_bytes(),
            br#"{"e":"65537","n":"3233"}"#.to_vec()
        );
    }
}
