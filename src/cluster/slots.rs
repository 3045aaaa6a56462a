//! Key-to-Slot Hashing
//!
//! Slot assignment must be computable independently by any client or tool, so
//! the checksum is pinned exactly: a reflected table-driven CRC-32 over the raw
//! key bytes using the reversed polynomial `0xD5828281`, with `0xFFFFFFFF`
//! init and final xor, reduced modulo the slot count. No ecosystem CRC crate
//! in use here exposes this table construction directly, so the table is built
//! at compile time instead of loaded from a dependency.

/// Total number of slots the keyspace is hashed into.
pub const SLOT_COUNT: u32 = 16384;

/// Reversed-form CRC-32 polynomial the slot checksum is pinned to.
const CRC_POLY: u32 = 0xD582_8281;

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ CRC_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

/// CRC-32 checksum of `bytes` under the pinned polynomial.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &b in bytes {
        crc = CRC_TABLE[((crc ^ b as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

/// Maps a key to its slot. Deterministic and stable across processes.
pub fn slot_for_key(key: &str) -> u32 {
    checksum(key.as_bytes()) % SLOT_COUNT
}
