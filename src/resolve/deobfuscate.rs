/*!
 * Reversal of the player's script-packing scheme.
 *
 * The player page ships its session form inside a packed inline
 * script. The payload appears as a call of the shape
 * `("<data>",<n>,"<key>",<offset>,<base>,...)`: each segment of
 * `<data>` up to the separator character `key[base]` is a base-`base`
 * numeral whose digits are indexes into `key`; the decoded character
 * is `char(value - offset)`.
 *
 * The scheme is treated as an opaque byte-exact contract. It is
 * validated against captured fixtures, never re-derived from live
 * traffic.
 */

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches the packed-payload call and captures data, key, offset, base
static PACKED_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\("(\w+)",\d+,"(\w+)",(\d+),(\d+),\d+\)"#)
        .expect("packed-call pattern is valid")
});

/// Matches the hidden token input, either attribute order
static TOKEN_FIELDS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r#"name="_token"\s+value="([^"]+)""#).expect("token pattern is valid"),
        Regex::new(r#"value="([^"]+)"\s+name="_token""#).expect("token pattern is valid"),
    ]
});

/// Matches the reported media size field
static SIZE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"size["']?\s*[:=]\s*["']?([\d.]+\s*[KMGT]?i?B?)"#)
        .expect("size pattern is valid")
});

/// Fields extracted from the deobfuscated player script
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFields {
    /// Redirect token posted to the resolver
    pub token: String,
    /// Media size as reported by the player, if present
    pub size: Option<String>,
}

/// Recover the plaintext script from an obfuscated source.
///
/// Locates the packed payload and decodes it; fails if no payload of
/// the expected shape is present.
pub fn deobfuscate(obfuscated: &str) -> Result<String> {
    let captures = PACKED_CALL
        .captures(obfuscated)
        .ok_or_else(|| anyhow!("No packed payload found in script"))?;

    let data = &captures[1];
    let key = &captures[2];
    let offset: u32 = captures[3].parse().context("Packed offset is not a number")?;
    let base: u32 = captures[4].parse().context("Packed base is not a number")?;

    decode_packed(data, key, offset, base)
}

/// Decode one packed data string with the given key alphabet.
fn decode_packed(data: &str, key: &str, offset: u32, base: u32) -> Result<String> {
    let key_chars: Vec<char> = key.chars().collect();
    let separator = *key_chars
        .get(base as usize)
        .ok_or_else(|| anyhow!("Packed base {} exceeds key length {}", base, key_chars.len()))?;

    let digit_of = |c: char| -> Result<u64> {
        key_chars
            .iter()
            .position(|&k| k == c)
            .map(|i| i as u64)
            .ok_or_else(|| anyhow!("Packed data contains character outside key alphabet"))
    };

    let mut plaintext = String::new();
    for segment in data.split(separator) {
        if segment.is_empty() {
            continue;
        }

        let mut value: u64 = 0;
        for c in segment.chars() {
            value = value
                .checked_mul(base as u64)
                .and_then(|v| v.checked_add(digit_of(c).ok()?))
                .ok_or_else(|| anyhow!("Packed segment overflows"))?;
        }

        let code = value
            .checked_sub(offset as u64)
            .ok_or_else(|| anyhow!("Packed segment underflows the offset"))?;
        let decoded = char::from_u32(code as u32)
            .ok_or_else(|| anyhow!("Packed segment decodes outside the char range"))?;
        plaintext.push(decoded);
    }

    Ok(plaintext)
}

/// Pull the token and reported size out of a deobfuscated script.
pub fn extract_fields(plaintext: &str) -> Result<ExtractedFields> {
    let token = TOKEN_FIELDS
        .iter()
        .find_map(|pattern| pattern.captures(plaintext))
        .map(|c| c[1].to_string())
        .ok_or_else(|| anyhow!("No token field in deobfuscated script"))?;

    let size = SIZE_FIELD
        .captures(plaintext)
        .map(|c| c[1].trim().to_string());

    Ok(ExtractedFields { token, size })
}
