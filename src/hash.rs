use serde::Serialize;

/// Digest that unlocks the gate.
pub const TARGET_HASH: u32 = 0xDEAD_BEEF;

/// Multiplier applied to the accumulator before each byte is folded in.
pub const MULTIPLIER: u32 = 33;

/// Multiplicative inverse of [`MULTIPLIER`] modulo 2^32.
pub const INVERSE_MULTIPLIER: u32 = 0x3E0F_83E1;

/// Bias added to every byte (after widening) before it is mixed in.
pub const BYTE_BIAS: u32 = 0x13;

/// Streaming form of the password hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PasswordHasher {
    acc: u32,
}

impl PasswordHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from an intermediate accumulator value.
    pub fn from_state(acc: u32) -> Self {
        Self { acc }
    }

    pub fn update(&mut self, byte: u8) -> &mut Self {
        self.acc = step(self.acc, byte);
        self
    }

    pub fn update_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        for &byte in bytes {
            self.update(byte);
        }
        self
    }

    pub fn finish(&self) -> u32 {
        self.acc
    }
}

/// Fold `bytes` into a 32-bit digest. Total: the empty input hashes to 0.
pub fn hash_password(bytes: &[u8]) -> u32 {
    PasswordHasher::new().update_bytes(bytes).finish()
}

/// One accumulator step: `acc * 33 ^ (byte + 0x13)`, wrapping mod 2^32.
#[inline]
pub fn step(acc: u32, byte: u8) -> u32 {
    acc.wrapping_mul(MULTIPLIER) ^ (u32::from(byte) + BYTE_BIAS)
}

/// Undo a single [`step`], recovering the accumulator that preceded `byte`.
#[inline]
pub fn unwind(acc: u32, byte: u8) -> u32 {
    (acc ^ (u32::from(byte) + BYTE_BIAS)).wrapping_mul(INVERSE_MULTIPLIER)
}

/// Render a digest the way reports and logs print it.
pub fn format_hash(hash: u32) -> String {
    format!("0x{hash:08x}")
}

/// JSON report emitted by the `hash` subcommand.
#[derive(Debug, Clone, Serialize)]
pub struct DigestReport {
    pub input: String,
    pub length: usize,
    pub hash: String,
    pub decimal: u32,
    pub matches_target: bool,
}

impl DigestReport {
    pub fn new(bytes: &[u8]) -> Self {
        let hash = hash_password(bytes);
        Self {
            input: String::from_utf8_lossy(bytes).into_owned(),
            length: bytes.len(),
            hash: format_hash(hash),
            decimal: hash,
            matches_target: hash == TARGET_HASH,
        }
    }
}
