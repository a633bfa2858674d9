//! SS58 address classification, used only to decide which derived string
//! columns belong in a dynamic table's `ORDER BY` clause (§4.F: "…SS58-looking
//! string columns…").
//!
//! This is a lightweight structural check (base58 decode + checksum), not
//! a full network-prefix registry lookup — sufficient to distinguish
//! "this string is an address" from "this string is arbitrary event data".

use base58::ToBase58;
use blake2::Blake2b512;
use blake2::digest::Digest;

const SS58_PREFIX: &[u8] = b"SS58PRE";

/// Generic Substrate network id (42) — used when encoding an address for
/// display/ordering purposes rather than submission to a specific chain,
/// which is all the dynamic-schema engine and the owner/stake map shovels
/// ever need (§3, §4.F).
const GENERIC_NETWORK_ID: u8 = 42;

/// SS58-encode a 32-byte account id, the inverse of the checksum scheme
/// [`is_valid_ss58_address`] validates. Used to turn raw `AccountId32`
/// bytes recovered from a storage map key back into the address string
/// every output table stores (§4.H/I owner and stake maps).
pub fn ss58_encode(account_id: &[u8; 32]) -> String {
    let mut body = Vec::with_capacity(33);
    body.push(GENERIC_NETWORK_ID);
    body.extend_from_slice(account_id);

    let mut hasher = <Blake2b512 as Digest>::new();
    hasher.update(SS58_PREFIX);
    hasher.update(&body);
    let digest: [u8; 64] = hasher.finalize().into();

    let mut data = body;
    data.extend_from_slice(&digest[..2]);
    data.to_base58()
}

/// `true` if `s` decodes as base58 and its trailing checksum bytes match
/// a blake2b-512("SS58PRE" || payload) hash, the scheme Substrate chains
/// use for their account addresses.
pub fn is_valid_ss58_address(s: &str) -> bool {
    let Ok(data) = base58::FromBase58::from_base58(s) else {
        return false;
    };
    // 1-byte prefix + 32-byte account id + 2-byte checksum is the common
    // shape; some networks use a 2-byte prefix. Accept both.
    if data.len() != 35 && data.len() != 36 {
        return false;
    }
    let checksum_len = 2;
    let (body, checksum) = data.split_at(data.len() - checksum_len);

    let mut hasher = <Blake2b512 as Digest>::new();
    hasher.update(SS58_PREFIX);
    hasher.update(body);
    let digest: [u8; 64] = hasher.finalize().into();

    &digest[..checksum_len] == checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_base58_garbage() {
        assert!(!is_valid_ss58_address("not-an-address!!"));
    }

    #[test]
    fn rejects_wrong_length_payload() {
        // Valid base58 alphabet, but far too short to be an SS58 address.
        assert!(!is_valid_ss58_address("abc"));
    }

    #[test]
    fn encode_then_validate_round_trips() {
        let account = [7u8; 32];
        let address = ss58_encode(&account);
        assert!(is_valid_ss58_address(&address));
    }
}
