//! The server side of the certification exchange: redeem a single-use
//! invite token for exactly one blind signature.

use crate::{blind, parse_decimal, Error, PollStore};
use num_bigint_dig::BigUint;
use uuid::Uuid;

/// Redeem `access_token` for a blind signature over `blinded_hash`.
///
/// The token is consumed through the store's atomic conditional operation
/// before the signature is computed, so of two concurrent redemptions of
/// the same token exactly one succeeds. Unknown and already-consumed tokens
/// produce the same error on purpose.
pub fn redeem<S: PollStore + ?Sized>(
    store: &S,
    poll_id: &Uuid,
    access_token: &str,
    blinded_hash: &str,
) -> Result<BigUint, Error> {
    let poll = store.fetch(poll_id)?;
    if !poll.is_signed {
        return Err(Error::PollNotSigned);
    }
    if access_token.is_empty() {
        return Err(Error::MissingAccessToken);
    }

    // Validate the payload before burning the token
    let blinded = parse_decimal(blinded_hash)?;
    let key = poll.key.as_ref().ok_or(Error::KeyMaterialMissing)?;
    if blinded >= key.n {
        return Err(Error::BlindedValueOutOfRange);
    }

    let poll = store.consume_access_token(poll_id, access_token)?;
    let key = poll.key.as_ref().ok_or(Error::KeyMaterialMissing)?;
    blind::sign_blinded(key, &blinded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemStore, NewPoll, Poll, PollKey};

    fn signed_store() -> (MemStore, Uuid, PollKey) {
        let mut poll = Poll::new(NewPoll {
            question: "Cats or dogs?".into(),
            options: vec!["Cat".into(), "Dog".into()],
            is_multiple_choice: false,
            is_signed: false,
            access_tokens: None,
        })
        .unwrap();
        poll.is_signed = true;
        poll.access_tokens = vec!["invite-a".into(), "invite-b".into()];
        let key = PollKey::generate(512).unwrap();
        poll.key = Some(key.clone());

        let id = poll.id;
        let store = MemStore::default();
        store.insert(poll).unwrap();
        (store, id, key)
    }

    #[test]
    fn a_token_buys_exactly_one_signature() {
        let (store, id, key) = signed_store();
        let blinded = BigUint::from(987_654_321u64);

        let signature = redeem(&store, &id, "invite-a", "987654321").unwrap();
        assert_eq!(signature, blinded.modpow(&key.d, &key.n));

        // second redemption with the same token always fails,
        // regardless of payload
        assert!(matches!(
            redeem(&store, &id, "invite-a", "123"),
            Err(Error::TokenRejected)
        ));
        // unknown token: same error
        assert!(matches!(
            redeem(&store, &id, "stranger", "123"),
            Err(Error::TokenRejected)
        ));
    }

    #[test]
    fn malformed_payloads_do_not_burn_the_token() {
        let (store, id, key) = signed_store();

        assert!(matches!(
            redeem(&store, &id, "invite-a", "12abc"),
            Err(Error::MalformedInteger)
        ));
        assert!(matches!(
            redeem(&store, &id, "invite-a", &key.n.to_str_radix(10)),
            Err(Error::BlindedValueOutOfRange)
        ));
        assert!(matches!(
            redeem(&store, &id, "", "123"),
            Err(Error::MissingAccessToken)
        ));

        // the token is still redeemable
        redeem(&store, &id, "invite-a", "123").unwrap();
    }

    #[test]
    fn unsigned_polls_do_not_sign() {
        let poll = Poll::new(NewPoll {
            question: "Cats or dogs?".into(),
            options: vec!["Cat".into(), "Dog".into()],
            is_multiple_choice: false,
            is_signed: false,
            access_tokens: None,
        })
        .unwrap();
        let id = poll.id;
        let store = MemStore::default();
        store.insert(poll).unwrap();

        assert!(matches!(
            redeem(&store, &id, "whatever", "123"),
            Err(Error::PollNotSigned)
        ));
        assert!(matches!(
            redeem(&store, &Uuid::new_v4(), "whatever", "123"),
            Err(Error::PollNotFound)
        ));
    }

    #[test]
    fn ended_polls_refuse_redemption() {
        let (store, id, _key) = signed_store();
        store.set_ended(&id).unwrap();
        assert!(matches!(
            redeem(&store, &id, "invite-a", "123"),
            Err(Error::PollEnded)
        ));
    }
}
