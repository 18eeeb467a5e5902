use crate::{Error, Poll};
use num_bigint_dig::BigUint;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// The storage contract the protocol logic depends on.
///
/// Every check-then-mark ("add to set only if absent") is a single atomic
/// conditional mutation inside the store. Callers must never implement these
/// guards as separate read-then-write steps: two concurrent requests would
/// both observe "not yet used" and both succeed.
pub trait PollStore: Send + Sync {
    /// Store a freshly created poll.
    fn insert(&self, poll: Poll) -> Result<(), Error>;

    /// Fetch a poll snapshot by id.
    fn fetch(&self, id: &Uuid) -> Result<Poll, Error>;

    /// All unsigned (publicly listable) polls.
    fn unsigned_polls(&self) -> Vec<Poll>;

    /// All polls that have not ended, for live-channel recovery at startup.
    fn open_polls(&self) -> Vec<Poll>;

    /// Atomically mark an invite token as consumed. Fails with the same
    /// error whether the token is unknown or already consumed, so the two
    /// cases stay indistinguishable to callers. Returns the updated poll.
    fn consume_access_token(&self, id: &Uuid, token: &str) -> Result<Poll, Error>;

    /// Atomically record a vote: add the certification signature (if any)
    /// to the redeemed set and increment the tally for each chosen option,
    /// all-or-nothing. Fails on a replayed signature, an unknown option or
    /// an ended poll without mutating anything. Returns the updated poll.
    fn commit_vote(
        &self,
        id: &Uuid,
        certification: Option<&BigUint>,
        options: &[String],
    ) -> Result<Poll, Error>;

    /// Mark the poll as ended. Returns the updated poll and whether this
    /// call was the one that ended it.
    fn set_ended(&self, id: &Uuid) -> Result<(Poll, bool), Error>;
}

/// In-memory `PollStore`. The mutex spans each conditional mutation, which
/// is what makes the check-then-mark operations atomic.
#[derive(Default)]
pub struct MemStore {
    polls: Mutex<HashMap<Uuid, Poll>>,
}

impl PollStore for MemStore {
    fn insert(&self, poll: Poll) -> Result<(), Error> {
        let mut polls = self.polls.lock().unwrap();
        polls.insert(poll.id, poll);
        Ok(())
    }

    fn fetch(&self, id: &Uuid) -> Result<Poll, Error> {
        let polls = self.polls.lock().unwrap();
        polls.get(id).cloned().ok_or(Error::PollNotFound)
    }

    fn unsigned_polls(&self) -> Vec<Poll> {
        let polls = self.polls.lock().unwrap();
        polls.values().filter(|p| !p.is_signed).cloned().collect()
    }

    fn open_polls(&self) -> Vec<Poll> {
        let polls = self.polls.lock().unwrap();
        polls.values().filter(|p| !p.ended).cloned().collect()
    }

    fn consume_access_token(&self, id: &Uuid, token: &str) -> Result<Poll, Error> {
        let mut polls = self.polls.lock().unwrap();
        let poll = polls.get_mut(id).ok_or(Error::PollNotFound)?;
        if poll.ended {
            return Err(Error::PollEnded);
        }
        if !poll.access_tokens.iter().any(|t| t == token) {
            return Err(Error::TokenRejected);
        }
        if !poll.consumed_tokens.insert(token.to_owned()) {
            // already consumed; same error as unknown on purpose
            return Err(Error::TokenRejected);
        }
        Ok(poll.clone())
    }

    fn commit_vote(
        &self,
        id: &Uuid,
        certification: Option<&BigUint>,
        options: &[String],
    ) -> Result<Poll, Error> {
        let mut polls = self.polls.lock().unwrap();
        let poll = polls.get_mut(id).ok_or(Error::PollNotFound)?;
        if poll.ended {
            return Err(Error::PollEnded);
        }

        // Validate everything before touching any state
        if options.iter().any(|o| !poll.tally.contains_key(o)) {
            return Err(Error::InvalidOptions);
        }
        if let Some(certification) = certification {
            let canonical = certification.to_str_radix(10);
            if !poll.redeemed_signatures.insert(canonical) {
                return Err(Error::SignatureReplayed);
            }
        }

        for option in options {
            if let Some(count) = poll.tally.get_mut(option) {
                *count += 1;
            }
        }
        Ok(poll.clone())
    }

    fn set_ended(&self, id: &Uuid) -> Result<(Poll, bool), Error> {
        let mut polls = self.polls.lock().unwrap();
        let poll = polls.get_mut(id).ok_or(Error::PollNotFound)?;
        let newly_ended = !poll.ended;
        poll.ended = true;
        Ok((poll.clone(), newly_ended))
    }
}
