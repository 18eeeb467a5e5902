// All cryptographic integers (key components, blinded values, signatures)
// cross the wire as decimal strings, never as native numbers, to avoid
// precision loss in JSON consumers.

/// Decimal-string serde for `BigUint`, for use in `#[serde(with)]`
pub mod biguint_dec {
    use num_bigint_dig::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| de::Error::custom("expected a decimal integer string"))
    }
}
