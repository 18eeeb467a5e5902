use crate::{random_token, Error, PollKey, PollPublicKey, ValidationError, POLL_KEY_BITS};
use indexmap::IndexMap;
use std::collections::HashSet;
use uuid::Uuid;

/// A poll and all of its server-side state.
///
/// Invariants: key material is present iff the poll is signed; consumed
/// tokens are a subset of the invite tokens; once `ended` is set nothing
/// but derived views may change.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,

    /// Per-option vote counters, one zero-initialized entry per option.
    pub tally: IndexMap<String, u64>,

    pub is_multiple_choice: bool,
    pub is_signed: bool,

    /// Capability token held by the poll host; required to end the poll.
    pub host_token: String,

    /// Single-use invite tokens (signed polls only).
    pub access_tokens: Vec<String>,

    /// Invite tokens that have been redeemed for a blind signature.
    pub consumed_tokens: HashSet<String>,

    /// Certification signatures that have already been used to cast a vote.
    /// This set, not the token set, is the double-vote guard.
    pub redeemed_signatures: HashSet<String>,

    /// RSA key material; `Some` iff `is_signed`.
    pub key: Option<PollKey>,

    /// Unguessable id of the live-update channel, independent of the poll
    /// id so channel access does not leak from poll-id knowledge.
    pub channel_id: String,

    pub ended: bool,
}

/// How invite tokens are supplied at poll creation: an explicit list, or a
/// count of tokens to generate.
pub enum AccessTokenSpec {
    Tokens(Vec<String>),
    Count(usize),
}

/// Parameters for creating a poll.
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
    pub is_multiple_choice: bool,
    pub is_signed: bool,
    pub access_tokens: Option<AccessTokenSpec>,
}

impl Poll {
    /// Create a poll, generating the host token, the channel id and (for
    /// signed polls) the invite tokens and RSA key material.
    pub fn new(spec: NewPoll) -> Result<Poll, Error> {
        if spec.question.trim().is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }
        if spec.options.len() < 2 {
            return Err(ValidationError::NotEnoughOptions.into());
        }
        let unique: HashSet<&str> = spec.options.iter().map(String::as_str).collect();
        if unique.len() != spec.options.len() {
            return Err(ValidationError::DuplicateOptions.into());
        }

        let access_tokens = match (spec.is_signed, spec.access_tokens) {
            (false, None) => Vec::new(),
            (false, Some(_)) => return Err(ValidationError::UnexpectedAccessTokens.into()),
            (true, None) => return Err(ValidationError::MissingAccessTokens.into()),
            (true, Some(tokens)) => resolve_access_tokens(tokens)?,
        };

        // Key generation last, after all validation has passed
        let key = if spec.is_signed {
            Some(PollKey::generate(POLL_KEY_BITS)?)
        } else {
            None
        };

        let tally = spec
            .options
            .iter()
            .map(|option| (option.clone(), 0u64))
            .collect();

        Ok(Poll {
            id: Uuid::new_v4(),
            question: spec.question,
            options: spec.options,
            tally,
            is_multiple_choice: spec.is_multiple_choice,
            is_signed: spec.is_signed,
            host_token: random_token(),
            access_tokens,
            consumed_tokens: HashSet::new(),
            redeemed_signatures: HashSet::new(),
            key,
            channel_id: random_token(),
            ended: false,
        })
    }

    /// The public view of the poll: everything a voter may see, never the
    /// private key material or any token set.
    pub fn projection(&self) -> PollProjection {
        PollProjection {
            id: self.id,
            channel_id: self.channel_id.clone(),
            question: self.question.clone(),
            options: self.options.clone(),
            tally: self.tally.clone(),
            is_multiple_choice: self.is_multiple_choice,
            is_signed: self.is_signed,
            ended: self.ended,
            public_key: self.key.as_ref().map(PollKey::public),
        }
    }

    /// Whether `token` may read this poll. Unsigned polls are public;
    /// signed polls require the host token or a member of the invite set
    /// (consumed tokens still authorize reads).
    pub fn authorizes(&self, token: Option<&str>) -> bool {
        if !self.is_signed {
            return true;
        }
        match token {
            Some(token) => {
                self.host_token == token || self.access_tokens.iter().any(|t| t == token)
            }
            None => false,
        }
    }

    pub fn is_host(&self, token: &str) -> bool {
        self.host_token == token
    }
}

fn resolve_access_tokens(spec: AccessTokenSpec) -> Result<Vec<String>, Error> {
    match spec {
        AccessTokenSpec::Tokens(tokens) => {
            if tokens.len() < 2 {
                return Err(ValidationError::NotEnoughAccessTokens.into());
            }
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            if unique.len() != tokens.len() {
                return Err(ValidationError::DuplicateAccessTokens.into());
            }
            Ok(tokens)
        }
        AccessTokenSpec::Count(count) => {
            if count < 2 {
                return Err(ValidationError::NotEnoughAccessTokens.into());
            }
            Ok((0..count).map(|_| random_token()).collect())
        }
    }
}

/// Public poll projection as it appears on the wire.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PollProjection {
    pub id: Uuid,
    pub channel_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub tally: IndexMap<String, u64>,
    pub is_multiple_choice: bool,
    pub is_signed: bool,
    pub ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PollPublicKey>,
}
