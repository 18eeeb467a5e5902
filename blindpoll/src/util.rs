use crate::Error;
use num_bigint_dig::BigUint;
use rand::RngCore;

/// Generate an unguessable token (access tokens, host tokens, channel ids).
///
/// 256 bits from the OS CSPRNG, hex-encoded.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Parse a decimal-string encoded arbitrary-precision integer.
pub fn parse_decimal(value: &str) -> Result<BigUint, Error> {
    value.parse().map_err(|_| Error::MalformedInteger)
}
