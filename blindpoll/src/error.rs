use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("blindpoll: poll not found")]
    PollNotFound,

    #[error("blindpoll: poll has ended")]
    PollEnded,

    #[error("blindpoll: poll does not use signed voting")]
    PollNotSigned,

    #[error("blindpoll: access denied")]
    AccessDenied,

    #[error("blindpoll: access token rejected")]
    TokenRejected,

    #[error("blindpoll: missing access token")]
    MissingAccessToken,

    #[error("blindpoll: host token mismatch")]
    HostTokenMismatch,

    #[error("blindpoll: certification signature already redeemed")]
    SignatureReplayed,

    #[error("blindpoll: certification signature is not valid")]
    CertificationInvalid,

    #[error("blindpoll: message signature is not valid")]
    MessageSignatureInvalid,

    #[error("blindpoll: missing signed ballot fields")]
    MissingSignedFields,

    #[error("blindpoll: ballot message is malformed")]
    MalformedBallot,

    #[error("blindpoll: option selection is not valid")]
    InvalidOptions,

    #[error("blindpoll: not a decimal integer")]
    MalformedInteger,

    #[error("blindpoll: blinded value out of range")]
    BlindedValueOutOfRange,

    #[error("blindpoll: blinding factor is not invertible")]
    NonInvertibleBlindingFactor,

    #[error("blindpoll: unblinded signature failed verification")]
    UnblindVerifyFailed,

    #[error("blindpoll: poll key material is missing")]
    KeyMaterialMissing,

    #[error("blindpoll: key generation failed")]
    KeyGeneration,

    #[error("blindpoll: RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Poll creation validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("blindpoll validation: question must not be empty")]
    EmptyQuestion,

    #[error("blindpoll validation: at least two options are required")]
    NotEnoughOptions,

    #[error("blindpoll validation: options must be pairwise unique")]
    DuplicateOptions,

    #[error("blindpoll validation: at least two access tokens are required")]
    NotEnoughAccessTokens,

    #[error("blindpoll validation: access tokens must be pairwise unique")]
    DuplicateAccessTokens,

    #[error("blindpoll validation: access tokens are only valid for signed polls")]
    UnexpectedAccessTokens,

    #[error("blindpoll validation: signed polls require access tokens or a token count")]
    MissingAccessTokens,

    #[error("blindpoll validation: provide either access tokens or a token count, not both")]
    AmbiguousAccessTokens,
}
