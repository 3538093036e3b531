//! Key to hash-slot mapping (CRC16/XMODEM with hash tags)

/// Number of hash slots in a cluster
pub const SLOT_COUNT: u16 = 16384;

/// Calculate slot for key using CRC16
///
/// If the key contains `{...}` with a non-empty body, only the part between
/// the first `{` and the following `}` is hashed, so `{user1}.name` and
/// `{user1}.age` land on the same slot.
pub fn slot_for_key(key: &[u8]) -> u16 {
    crc16(hash_tag(key).unwrap_or(key)) % SLOT_COUNT
}

/// Hash tag of a key, if it has a non-empty one
pub fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let start = key.iter().position(|&b| b == b'{')?;
    let len = key[start + 1..].iter().position(|&b| b == b'}')?;
    (len > 0).then(|| &key[start + 1..start + 1 + len])
}

/// CRC16 implementation for cluster slot calculation (XMODEM)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
