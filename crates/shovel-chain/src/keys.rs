//! Storage map key decoding.
//!
//! `query_map` hands back raw key bytes (§4.D note on `MapEntry`) rather
//! than a fully decoded key, since dynamic storage iteration has no
//! metadata-driven hasher to decode against generically. For the two maps
//! this workspace actually needs to decompose — the hotkey→coldkey owner
//! map and the (hotkey, coldkey)→stake double map — the hasher is known
//! (`Blake2_128Concat`), which preserves the original encoded key after
//! its 16-byte hash: stripping the fixed 32-byte pallet+item prefix and
//! then, per key component, a 16-byte hash followed by the 32-byte
//! `AccountId32` it hashed, recovers the original account ids without a
//! metadata round trip.

use shovel_schema::ss58_encode;

const PALLET_ITEM_PREFIX_LEN: usize = 32;
const HASH_LEN: usize = 16;
const ACCOUNT_ID_LEN: usize = 32;

fn decode_hex(raw_key_hex: &str) -> Option<Vec<u8>> {
    hex::decode(raw_key_hex.strip_prefix("0x").unwrap_or(raw_key_hex)).ok()
}

/// Decode a single-key `Blake2_128Concat` map's raw storage key into the
/// `AccountId32` it was built from (e.g. the owner map's `hotkey` key).
pub fn decode_single_accountid_key(raw_key_hex: &str) -> Option<String> {
    let bytes = decode_hex(raw_key_hex)?;
    let expected = PALLET_ITEM_PREFIX_LEN + HASH_LEN + ACCOUNT_ID_LEN;
    if bytes.len() != expected {
        return None;
    }
    let account_start = PALLET_ITEM_PREFIX_LEN + HASH_LEN;
    let mut account = [0u8; ACCOUNT_ID_LEN];
    account.copy_from_slice(&bytes[account_start..account_start + ACCOUNT_ID_LEN]);
    Some(ss58_encode(&account))
}

/// Decode a double-key `Blake2_128Concat` map's raw storage key into the
/// two `AccountId32`s it was built from (e.g. the stake double map's
/// `(hotkey, coldkey)` key).
pub fn decode_double_accountid_key(raw_key_hex: &str) -> Option<(String, String)> {
    let bytes = decode_hex(raw_key_hex)?;
    let component_len = HASH_LEN + ACCOUNT_ID_LEN;
    let expected = PALLET_ITEM_PREFIX_LEN + 2 * component_len;
    if bytes.len() != expected {
        return None;
    }

    let first_start = PALLET_ITEM_PREFIX_LEN + HASH_LEN;
    let mut first = [0u8; ACCOUNT_ID_LEN];
    first.copy_from_slice(&bytes[first_start..first_start + ACCOUNT_ID_LEN]);

    let second_start = first_start + ACCOUNT_ID_LEN + HASH_LEN;
    let mut second = [0u8; ACCOUNT_ID_LEN];
    second.copy_from_slice(&bytes[second_start..second_start + ACCOUNT_ID_LEN]);

    Some((ss58_encode(&first), ss58_encode(&second)))
}

/// Decode an `Identity`-hashed map key's raw payload into a little-endian
/// `u16` (e.g. `SubtensorModule.NetworksAdded`'s `netuid` key): `Identity`
/// performs no hashing, so everything after the fixed 32-byte pallet+item
/// prefix is exactly the SCALE-encoded key.
pub fn decode_identity_u16_key(raw_key_hex: &str) -> Option<u16> {
    let bytes = decode_hex(raw_key_hex)?;
    if bytes.len() != PALLET_ITEM_PREFIX_LEN + 2 {
        return None;
    }
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[PALLET_ITEM_PREFIX_LEN..]);
    Some(u16::from_le_bytes(buf))
}

/// Decode a two-component map key whose first component is an
/// `Identity`-hashed `u16` (no hashing, raw SCALE payload) and whose
/// second is a `Blake2_128Concat`-hashed `AccountId32` (e.g. the axon
/// map's `(netuid, hotkey)` key).
pub fn decode_u16_accountid_key(raw_key_hex: &str) -> Option<(u16, String)> {
    let bytes = decode_hex(raw_key_hex)?;
    let expected = PALLET_ITEM_PREFIX_LEN + 2 + HASH_LEN + ACCOUNT_ID_LEN;
    if bytes.len() != expected {
        return None;
    }
    let mut netuid_buf = [0u8; 2];
    netuid_buf.copy_from_slice(&bytes[PALLET_ITEM_PREFIX_LEN..PALLET_ITEM_PREFIX_LEN + 2]);
    let netuid = u16::from_le_bytes(netuid_buf);

    let account_start = PALLET_ITEM_PREFIX_LEN + 2 + HASH_LEN;
    let mut account = [0u8; ACCOUNT_ID_LEN];
    account.copy_from_slice(&bytes[account_start..account_start + ACCOUNT_ID_LEN]);

    Some((netuid, ss58_encode(&account)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_key(components: usize) -> String {
        let mut bytes = vec![0xABu8; PALLET_ITEM_PREFIX_LEN];
        for i in 0..components {
            bytes.extend(std::iter::repeat(0x11).take(HASH_LEN));
            bytes.extend(std::iter::repeat(i as u8 + 1).take(ACCOUNT_ID_LEN));
        }
        format!("0x{}", hex::encode(bytes))
    }

    #[test]
    fn single_key_decodes_when_length_matches() {
        let key = fake_key(1);
        assert!(decode_single_accountid_key(&key).is_some());
    }

    #[test]
    fn double_key_decodes_two_distinct_accounts() {
        let key = fake_key(2);
        let (a, b) = decode_double_accountid_key(&key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_length_key_is_rejected() {
        assert!(decode_single_accountid_key("0x1234").is_none());
    }

    #[test]
    fn identity_u16_key_round_trips() {
        let mut bytes = vec![0xABu8; PALLET_ITEM_PREFIX_LEN];
        bytes.extend_from_slice(&42u16.to_le_bytes());
        let key = format!("0x{}", hex::encode(bytes));
        assert_eq!(decode_identity_u16_key(&key), Some(42));
    }

    #[test]
    fn u16_accountid_key_round_trips() {
        let mut bytes = vec![0xABu8; PALLET_ITEM_PREFIX_LEN];
        bytes.extend_from_slice(&7u16.to_le_bytes());
        bytes.extend(std::iter::repeat(0x11).take(HASH_LEN));
        bytes.extend(std::iter::repeat(0x22).take(ACCOUNT_ID_LEN));
        let key = format!("0x{}", hex::encode(bytes));
        let (netuid, _hotkey) = decode_u16_accountid_key(&key).unwrap();
        assert_eq!(netuid, 7);
    }
}
