/// The CNS (contract name service) precompile. It maps a contract name and version to an address and ABI.
pub mod cns {
    use alloy::primitives::{address, Address};
    use ethabi::{Contract, Function, Token};
    use once_cell::sync::Lazy;

    use crate::error::{Result, StubError};

    pub const ADDRESS: Address = address!("0000000000000000000000000000000000001004");

    pub const METHOD_INSERT: &str = "insert";
    pub const METHOD_SELECT_BY_NAME: &str = "selectByName";
    pub const METHOD_SELECT_BY_NAME_AND_VERSION: &str = "selectByNameAndVersion";

    // Taken from `CNS.sol` in FISCO BCOS 2.x, with the legacy `constant` and `payable` keys removed.
    const ABI: &str = include_str!("cns.json");
    static CONTRACT: Lazy<Contract> = Lazy::new(|| serde_json::from_str(ABI).unwrap());
    pub static INSERT: Lazy<Function> =
        Lazy::new(|| CONTRACT.function(METHOD_INSERT).unwrap().clone());
    pub static SELECT_BY_NAME: Lazy<Function> =
        Lazy::new(|| CONTRACT.function(METHOD_SELECT_BY_NAME).unwrap().clone());
    pub static SELECT_BY_NAME_AND_VERSION: Lazy<Function> =
        Lazy::new(|| CONTRACT.function(METHOD_SELECT_BY_NAME_AND_VERSION).unwrap().clone());

    pub fn encode_insert(
        name: &str,
        version: &str,
        address: Address,
        abi: &str,
    ) -> Result<Vec<u8>> {
        encode(
            &INSERT,
            &[
                Token::String(name.to_owned()),
                Token::String(version.to_owned()),
                Token::String(address.to_string()),
                Token::String(abi.to_owned()),
            ],
        )
    }

    pub fn encode_select_by_name(name: &str) -> Result<Vec<u8>> {
        encode(&SELECT_BY_NAME, &[Token::String(name.to_owned())])
    }

    pub fn encode_select_by_name_and_version(name: &str, version: &str) -> Result<Vec<u8>> {
        encode(
            &SELECT_BY_NAME_AND_VERSION,
            &[
                Token::String(name.to_owned()),
                Token::String(version.to_owned()),
            ],
        )
    }

    /// Decodes the single `string` both select methods return: a JSON array of registry entries.
    pub fn decode_select_output(output: &[u8]) -> Result<String> {
        let tokens = SELECT_BY_NAME
            .decode_output(output)
            .map_err(|e| StubError::transport(format!("malformed CNS output: {e}")))?;
        match tokens.into_iter().next() {
            Some(Token::String(s)) => Ok(s),
            other => Err(StubError::transport(format!(
                "unexpected CNS output: {other:?}"
            ))),
        }
    }

    fn encode(function: &Function, tokens: &[Token]) -> Result<Vec<u8>> {
        function
            .encode_input(tokens)
            .map_err(|e| StubError::InvalidArgs(format!("{}: {e}", function.name)))
    }

}
