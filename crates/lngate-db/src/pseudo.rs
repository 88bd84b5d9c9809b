//! Random pseudonym generators and value codecs.
//!
//! Pseudonyms keep the shape of the value they replace: hex strings map
//! to hex strings of the same length, integers to integers, channel
//! points to syntactically valid channel points. All randomness comes
//! from the OS random source.

use lngate_types::{GateError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Alphabet pseudonym strings are drawn from.
const PSEUDO_STR_ALPHABET: &[u8] = b"abcdef0123456789";

/// Character length of a transaction id in channel point notation.
const TXID_STR_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Generates a random string of `n` hex-alphabet characters.
pub fn new_pseudo_str(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);

    bytes
        .iter()
        .map(|b| PSEUDO_STR_ALPHABET[(*b as usize) % PSEUDO_STR_ALPHABET.len()] as char)
        .collect()
}

/// Generates a uniform random `u32` from four big-endian random bytes.
pub fn new_pseudo_u32() -> u32 {
    let mut b = [0u8; 4];
    OsRng.fill_bytes(&mut b);
    u32::from_be_bytes(b)
}

/// Generates a uniform random `u64` from eight big-endian random bytes,
/// returning both the value and its canonical map key form.
pub fn new_pseudo_u64() -> (u64, String) {
    let mut b = [0u8; 8];
    OsRng.fill_bytes(&mut b);
    (u64::from_be_bytes(b), hex::encode(b))
}

/// Generates a syntactic channel point `<64-char hex>:<u32>` with no
/// on-chain meaning.
pub fn new_pseudo_chan_point() -> String {
    encode_chan_point(&new_pseudo_str(TXID_STR_LEN), new_pseudo_u32())
}

// ---------------------------------------------------------------------------
// Codecs
// ---------------------------------------------------------------------------

/// Canonical 16-character big-endian hex form of a `u64`, used as the
/// map key for integer values so the string store handles them
/// uniformly.
pub fn u64_to_str(value: u64) -> String {
    hex::encode(value.to_be_bytes())
}

/// Parses the canonical hex form produced by [`u64_to_str`].
pub fn str_to_u64(s: &str) -> Result<u64> {
    let bytes = hex::decode(s).map_err(|e| GateError::Storage {
        reason: format!("invalid integer key encoding: {e}"),
    })?;

    let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| GateError::Storage {
        reason: format!("integer key must be 8 bytes, got {}", bytes.len()),
    })?;

    Ok(u64::from_be_bytes(arr))
}

/// Renders a channel point as `<txid>:<index>`.
pub fn encode_chan_point(txid: &str, index: u32) -> String {
    format!("{txid}:{index}")
}

/// Splits a `<txid>:<index>` channel point into its parts.
pub fn decode_chan_point(cp: &str) -> Result<(String, u32)> {
    let mut parts = cp.split(':');
    let (Some(txid), Some(index), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(GateError::Intercept {
            reason: format!("bad channel point encoding: {cp}"),
        });
    };

    let index: u32 = index.parse().map_err(|_| GateError::Intercept {
        reason: format!("bad channel point output index: {cp}"),
    })?;

    Ok((txid.to_string(), index))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_str_has_requested_length_and_alphabet() {
        for n in [0, 1, 16, 64] {
            let s = new_pseudo_str(n);
            assert_eq!(s.len(), n);
            assert!(s.bytes().all(|b| PSEUDO_STR_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn u64_str_roundtrip() -> Result<()> {
        for value in [0u64, 1, 123, u64::MAX] {
            let s = u64_to_str(value);
            assert_eq!(s.len(), 16);
            assert_eq!(str_to_u64(&s)?, value);
        }
        Ok(())
    }

    #[test]
    fn u64_to_str_is_big_endian_hex() {
        assert_eq!(u64_to_str(123), "000000000000007b");
        assert_eq!(u64_to_str(0x141), "0000000000000141");
    }

    #[test]
    fn str_to_u64_rejects_bad_input() {
        assert!(str_to_u64("zz").is_err());
        assert!(str_to_u64("abcd").is_err());
    }

    #[test]
    fn chan_point_roundtrip() -> Result<()> {
        let cp = encode_chan_point(&"ab".repeat(32), 7);
        let (txid, index) = decode_chan_point(&cp)?;
        assert_eq!(txid, "ab".repeat(32));
        assert_eq!(index, 7);
        Ok(())
    }

    #[test]
    fn decode_chan_point_rejects_bad_input() {
        assert!(decode_chan_point("no-colon").is_err());
        assert!(decode_chan_point("a:b:c").is_err());
        assert!(decode_chan_point("abcd:not-a-number").is_err());
    }

    #[test]
    fn pseudo_chan_point_is_well_formed() -> Result<()> {
        let cp = new_pseudo_chan_point();
        let (txid, _) = decode_chan_point(&cp)?;
        assert_eq!(txid.len(), TXID_STR_LEN);
        Ok(())
    }
}
