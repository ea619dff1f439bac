//! Stable 32-bit book identifiers.
//!
//! A book's id is a pure function of its filename bytes, so it survives
//! reboots, database rebuilds and storage reordering, and stays the join
//! key for per-book side state (cover files, reading positions).
//!
//! Jenkins96 algorithm. See: http://burtleburtle.net/bob/hash/evahash.html
//! Words are loaded little-endian so the value is identical on every
//! platform.

const GOLDEN_RATIO: u32 = 0x9e37_79b9;

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 13);
    *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 8);
    *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 13);
    *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 12);
    *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 16);
    *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 5);
    *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 3);
    *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 10);
    *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 15);
}

fn load_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Hash `key` into a stable 32-bit identifier.
pub fn generate_id(key: &[u8]) -> u32 {
    let mut a = GOLDEN_RATIO;
    let mut b = GOLDEN_RATIO;
    let mut c: u32 = 0;

    let mut chunks = key.chunks_exact(12);
    for block in &mut chunks {
        a = a.wrapping_add(load_u32(&block[0..4]));
        b = b.wrapping_add(load_u32(&block[4..8]));
        c = c.wrapping_add(load_u32(&block[8..12]));
        mix(&mut a, &mut b, &mut c);
    }

    // Tail of 0..=11 bytes; the first byte of c is reserved for the length.
    let tail = chunks.remainder();
    c = c.wrapping_add(key.len() as u32);
    for (i, &byte) in tail.iter().enumerate() {
        let value = byte as u32;
        match i {
            0..=3 => a = a.wrapping_add(value << (8 * i)),
            4..=7 => b = b.wrapping_add(value << (8 * (i - 4))),
            _ => c = c.wrapping_add(value << (8 * (i - 7))),
        }
    }
    mix(&mut a, &mut b, &mut c);

    c
}
