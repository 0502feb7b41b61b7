/// Quantities as BCOS nodes emit them: a `0x`-prefixed hex string. Decimal strings and bare JSON numbers are also
/// accepted on input, since nodes are not consistent about it.
pub mod quantity {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Quantity {
            Number(u64),
            Text(String),
        }

        match Quantity::deserialize(deserializer)? {
            Quantity::Number(n) => Ok(n),
            Quantity::Text(s) => parse(&s).map_err(de::Error::custom),
        }
    }

    pub fn parse(s: &str) -> Result<u64, std::num::ParseIntError> {
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse(),
        }
    }
}

/// `Option<Address>` where the node may send `null`, an empty string or the zero address to mean "none".
pub mod option_address {
    use alloy::primitives::Address;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Address>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if s.is_empty() {
            return Ok(None);
        }
        let address: Address = s.parse().map_err(de::Error::custom)?;
        Ok((!address.is_zero()).then_some(address))
    }
}
