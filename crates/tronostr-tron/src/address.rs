//! TRON address codec: hex (`41…`, 21 bytes) ⇄ base58check (`T…`).

use thiserror::Error;

/// Mainnet address prefix byte.
pub const ADDRESS_PREFIX: u8 = 0x41;

const ADDRESS_LEN: usize = 21;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex address '{0}'")]
    InvalidHex(String),

    #[error("invalid base58 address '{0}'")]
    InvalidBase58(String),

    #[error("address must be {ADDRESS_LEN} bytes with prefix 0x41, got {0} bytes")]
    InvalidLength(usize),
}

/// Encode a hex address (`41…`, optional `0x`) as base58check.
pub fn to_base58(hex_address: &str) -> Result<String, AddressError> {
    let bytes = decode_hex(hex_address)?;
    Ok(bs58::encode(bytes).with_check().into_string())
}

/// Normalize a base58 or hex address to lowercase hex (`41…`).
pub fn to_hex(address: &str) -> Result<String, AddressError> {
    let address = address.trim();
    if address.starts_with('T') {
        let bytes = bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|_| AddressError::InvalidBase58(address.to_string()))?;
        check_shape(&bytes)?;
        Ok(hex::encode(bytes))
    } else {
        decode_hex(address).map(hex::encode)
    }
}

/// Best-effort display form: base58 when decodable, the input otherwise.
pub fn display(hex_address: &str) -> String {
    to_base58(hex_address).unwrap_or_else(|_| hex_address.to_string())
}

fn decode_hex(hex_address: &str) -> Result<Vec<u8>, AddressError> {
    let s = hex_address.strip_prefix("0x").unwrap_or(hex_address);
    let bytes = hex::decode(s).map_err(|_| AddressError::InvalidHex(hex_address.to_string()))?;
    check_shape(&bytes)?;
    Ok(bytes)
}

fn check_shape(bytes: &[u8]) -> Result<(), AddressError> {
    if bytes.len() != ADDRESS_LEN || bytes[0] != ADDRESS_PREFIX {
        return Err(AddressError::InvalidLength(bytes.len()));
    }
    Ok(())
}
