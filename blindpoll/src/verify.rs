//! Server-side vote verification and the at-most-once counting guard.

use crate::{blind, parse_decimal, Error, Poll, PollStore, VotingPublicKey};
use num_bigint_dig::BigUint;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use uuid::Uuid;

/// A cast vote as it arrives over the wire.
///
/// `message` is a self-describing JSON payload binding the poll id and the
/// chosen options. The three signed fields are required for signed polls and
/// ignored for unsigned ones.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voting_public_key: Option<VotingPublicKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification_signature: Option<String>,
}

/// The payload inside `Ballot::message`.
#[derive(Serialize, Deserialize, Clone)]
pub struct BallotMessage {
    pub id: Uuid,
    pub options: Vec<String>,
}

impl Ballot {
    /// A ballot for an unsigned poll: just the message, no signatures.
    pub fn unsigned(poll_id: Uuid, options: Vec<String>) -> Self {
        let message = serde_json::to_string(&BallotMessage {
            id: poll_id,
            options,
        })
        .unwrap();
        Ballot {
            message,
            message_signature: None,
            voting_public_key: None,
            certification_signature: None,
        }
    }
}

/// Validate a ballot and count it. Returns the updated poll so the caller
/// can broadcast the new tally.
///
/// All mutations are all-or-nothing: every check must pass before the
/// replay-record and the tally commit together in one atomic store
/// operation. A rejected ballot leaves no trace.
pub fn cast_vote<S: PollStore + ?Sized>(store: &S, ballot: &Ballot) -> Result<Poll, Error> {
    let message: BallotMessage =
        serde_json::from_str(&ballot.message).map_err(|_| Error::MalformedBallot)?;

    let poll = store.fetch(&message.id)?;
    if poll.ended {
        return Err(Error::PollEnded);
    }
    validate_options(&poll, &message.options)?;

    let certification = if poll.is_signed {
        Some(verify_signed_fields(&poll, ballot)?)
    } else {
        None
    };

    // The store re-checks the replay set and the ended flag under its lock,
    // so two concurrent casts of one signature cannot both land.
    store.commit_vote(&message.id, certification.as_ref(), &message.options)
}

fn validate_options(poll: &Poll, options: &[String]) -> Result<(), Error> {
    if options.is_empty() {
        return Err(Error::InvalidOptions);
    }
    if options.len() > 1 && !poll.is_multiple_choice {
        return Err(Error::InvalidOptions);
    }
    let unique: HashSet<&str> = options.iter().map(String::as_str).collect();
    if unique.len() != options.len() {
        return Err(Error::InvalidOptions);
    }
    if options.iter().any(|option| !poll.options.contains(option)) {
        return Err(Error::InvalidOptions);
    }
    Ok(())
}

fn verify_signed_fields(poll: &Poll, ballot: &Ballot) -> Result<BigUint, Error> {
    let (message_signature, voting_public_key, certification_signature) = match (
        &ballot.message_signature,
        &ballot.voting_public_key,
        &ballot.certification_signature,
    ) {
        (Some(sig), Some(key), Some(cert)) => (sig, key, cert),
        _ => return Err(Error::MissingSignedFields),
    };

    // an unparsable signature is treated as a missing credential
    let certification =
        parse_decimal(certification_signature).map_err(|_| Error::MissingSignedFields)?;

    let key = poll.key.as_ref().ok_or(Error::KeyMaterialMissing)?;

    // Replay check first. The redeemed-signature set, not the access token,
    // is the double-vote guard; it is deliberately decoupled from token
    // identity so a counted vote cannot be linked back to an invite.
    if poll
        .redeemed_signatures
        .contains(&certification.to_str_radix(10))
    {
        return Err(Error::SignatureReplayed);
    }

    // Proves the blind signer once certified exactly this voting key
    if !blind::verify_unblinded(&key.public(), &certification, &voting_public_key.hash_int()) {
        return Err(Error::CertificationInvalid);
    }

    // Proves the caller controls the certified key's private half
    verify_message_signature(voting_public_key, &ballot.message, message_signature)?;

    Ok(certification)
}

/// Standard RSA-SHA256 (PKCS#1 v1.5) verification of `message` under the
/// voting public key.
fn verify_message_signature(
    public: &VotingPublicKey,
    message: &str,
    signature: &str,
) -> Result<(), Error> {
    let signature = parse_decimal(signature).map_err(|_| Error::MissingSignedFields)?;

    let key = RsaPublicKey::new(public.n.clone(), public.e.clone())
        .map_err(|_| Error::MessageSignatureInvalid)?;

    let size = key.size();
    let bytes = signature.to_bytes_be();
    if bytes.len() > size {
        return Err(Error::MessageSignatureInvalid);
    }
    let mut padded = vec![0u8; size - bytes.len()];
    padded.extend_from_slice(&bytes);

    let digest = Sha256::digest(message.as_bytes());
    key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &padded)
        .map_err(|_| Error::MessageSignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemStore, NewPoll, PollKey, PollStore, VoterCredential, VotingIdentity};

    fn test_poll(signed: bool, multiple_choice: bool) -> Poll {
        let mut poll = Poll::new(NewPoll {
            question: "Cats or dogs?".into(),
            options: vec!["Cat".into(), "Dog".into(), "Fish".into()],
            is_multiple_choice: multiple_choice,
            is_signed: false,
            access_tokens: None,
        })
        .unwrap();
        if signed {
            poll.is_signed = true;
            poll.access_tokens = vec!["invite-a".into(), "invite-b".into()];
            poll.key = Some(PollKey::generate(512).unwrap());
        }
        poll
    }

    fn credential_for(poll: &Poll) -> VoterCredential {
        let key = poll.key.as_ref().unwrap();
        let public = key.public();
        let identity = VotingIdentity::generate_with_bits(&public, 512).unwrap();
        let blinded: BigUint = identity.blinded_hash().parse().unwrap();
        let blind_signature = crate::blind::sign_blinded(key, &blinded).unwrap();
        identity
            .finalize(&public, &blind_signature, "invite-a".into())
            .unwrap()
    }

    fn store_with(poll: Poll) -> (MemStore, Uuid) {
        let id = poll.id;
        let store = MemStore::default();
        store.insert(poll).unwrap();
        (store, id)
    }

    #[test]
    fn unsigned_vote_is_counted() {
        let (store, id) = store_with(test_poll(false, false));

        let poll = cast_vote(&store, &Ballot::unsigned(id, vec!["Cat".into()])).unwrap();
        assert_eq!(poll.tally["Cat"], 1);
        assert_eq!(poll.tally["Dog"], 0);
        assert_eq!(poll.tally["Fish"], 0);
    }

    #[test]
    fn option_validation() {
        let (store, id) = store_with(test_poll(false, false));

        // empty selection
        let err = cast_vote(&store, &Ballot::unsigned(id, vec![])).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions));

        // unknown option
        let err = cast_vote(&store, &Ballot::unsigned(id, vec!["Bird".into()])).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions));

        // two options on a single-choice poll
        let err = cast_vote(
            &store,
            &Ballot::unsigned(id, vec!["Cat".into(), "Dog".into()]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOptions));

        // duplicated option
        let (store, id) = store_with(test_poll(false, true));
        let err = cast_vote(
            &store,
            &Ballot::unsigned(id, vec!["Cat".into(), "Cat".into()]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOptions));
    }

    #[test]
    fn multi_choice_vote_counts_each_chosen_option() {
        let (store, id) = store_with(test_poll(false, true));

        let poll = cast_vote(
            &store,
            &Ballot::unsigned(id, vec!["Cat".into(), "Fish".into()]),
        )
        .unwrap();
        let sum: u64 = poll.tally.values().sum();
        assert_eq!(sum, 2);
        assert_eq!(poll.tally["Cat"], 1);
        assert_eq!(poll.tally["Fish"], 1);
    }

    #[test]
    fn malformed_or_unknown_ballots_are_rejected() {
        let (store, _) = store_with(test_poll(false, false));

        let mut ballot = Ballot::unsigned(Uuid::new_v4(), vec!["Cat".into()]);
        assert!(matches!(
            cast_vote(&store, &ballot),
            Err(Error::PollNotFound)
        ));

        ballot.message = "not json".into();
        assert!(matches!(
            cast_vote(&store, &ballot),
            Err(Error::MalformedBallot)
        ));
    }

    #[test]
    fn signed_vote_full_flow_and_replay() {
        let poll = test_poll(true, false);
        let credential = credential_for(&poll);
        let (store, id) = store_with(poll);

        let ballot = credential.ballot(id, vec!["Dog".into()]).unwrap();
        let poll = cast_vote(&store, &ballot).unwrap();
        assert_eq!(poll.tally["Dog"], 1);

        // the same certification signature can never be counted again
        let replay = credential.ballot(id, vec!["Cat".into()]).unwrap();
        assert!(matches!(
            cast_vote(&store, &replay),
            Err(Error::SignatureReplayed)
        ));
        let poll = store.fetch(&id).unwrap();
        assert_eq!(poll.tally["Dog"], 1);
        assert_eq!(poll.tally["Cat"], 0);
    }

    #[test]
    fn missing_signed_fields_are_rejected() {
        let poll = test_poll(true, false);
        let credential = credential_for(&poll);
        let (store, id) = store_with(poll);

        let mut ballot = credential.ballot(id, vec!["Dog".into()]).unwrap();
        ballot.message_signature = None;
        assert!(matches!(
            cast_vote(&store, &ballot),
            Err(Error::MissingSignedFields)
        ));

        let mut ballot = credential.ballot(id, vec!["Dog".into()]).unwrap();
        ballot.certification_signature = Some("not a number".into());
        assert!(matches!(
            cast_vote(&store, &ballot),
            Err(Error::MissingSignedFields)
        ));
    }

    #[test]
    fn forged_certification_is_rejected() {
        let poll = test_poll(true, false);
        let credential = credential_for(&poll);
        let (store, id) = store_with(poll);

        let mut ballot = credential.ballot(id, vec!["Dog".into()]).unwrap();
        // a signature never issued by this poll's signer
        ballot.certification_signature = Some("123456789".into());
        assert!(matches!(
            cast_vote(&store, &ballot),
            Err(Error::CertificationInvalid)
        ));

        let poll = store.fetch(&id).unwrap();
        assert!(poll.tally.values().all(|&count| count == 0));
    }

    #[test]
    fn tampered_message_is_rejected() {
        let poll = test_poll(true, false);
        let credential = credential_for(&poll);
        let (store, id) = store_with(poll);

        let mut ballot = credential.ballot(id, vec!["Dog".into()]).unwrap();
        // swap the message after signing
        ballot.message = serde_json::to_string(&BallotMessage {
            id,
            options: vec!["Cat".into()],
        })
        .unwrap();
        assert!(matches!(
            cast_vote(&store, &ballot),
            Err(Error::MessageSignatureInvalid)
        ));
    }

    #[test]
    fn ended_poll_rejects_fresh_credentials() {
        let poll = test_poll(true, false);
        let credential = credential_for(&poll);
        let (store, id) = store_with(poll);

        store.set_ended(&id).unwrap();

        let ballot = credential.ballot(id, vec!["Dog".into()]).unwrap();
        assert!(matches!(cast_vote(&store, &ballot), Err(Error::PollEnded)));
        assert!(store
            .fetch(&id)
            .unwrap()
            .tally
            .values()
            .all(|&count| count == 0));
    }
}
