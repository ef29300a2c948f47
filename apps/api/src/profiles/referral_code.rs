//! Referral code generation.
//!
//! Codes are short, upper-case and skip look-alike characters so they survive
//! being read aloud or retyped from a screenshot.

use rand::Rng;

pub const CODE_LEN: usize = 8;

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Builds the public invite link for a code.
pub fn referral_link(site_url: &str, code: &str) -> String {
    format!("{}/?ref={}", site_url.trim_end_matches('/'), code)
}
