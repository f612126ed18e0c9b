//! Reversible obfuscation for secrets cached in the local store.
//!
//! This only keeps values from being readable at a glance in the storage
//! file. It is not encryption: anyone holding this crate can reverse it.

use base64::{Engine, engine::general_purpose::STANDARD};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Repeating XOR key for [`Codec::XorHex`].
pub const OBFUSCATION_KEY: &[u8] = b"POLARIS_SOVEREIGN_2026";

/// Characters `encodeURIComponent` leaves untouched.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Obfuscation strategy used for cached values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Codec {
    /// UTF-8 bytes XORed with [`OBFUSCATION_KEY`], then lowercase hex.
    #[default]
    XorHex,
    /// Percent-encoding followed by standard Base64.
    Base64,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::XorHex => "xor-hex",
            Self::Base64 => "base64",
        }
    }

    /// Obfuscates `plaintext`.
    pub fn encode(&self, plaintext: &str) -> String {
        match self {
            Self::XorHex => hex::encode(xor_with_key(plaintext.as_bytes())),
            Self::Base64 => STANDARD.encode(utf8_percent_encode(plaintext, COMPONENT).to_string()),
        }
    }

    /// Reverses [`Codec::encode`]. Empty or malformed tokens decode to `""`.
    pub fn decode(&self, token: &str) -> String {
        if token.is_empty() {
            return String::new();
        }
        let decoded = match self {
            Self::XorHex => decode_xor_hex(token),
            Self::Base64 => decode_base64(token),
        };
        decoded.unwrap_or_else(|| {
            trace!(codec = self.name(), len = token.len(), "Discarding undecodable token");
            String::new()
        })
    }

    /// Like [`Codec::decode`] for values that may be absent.
    pub fn decode_opt(&self, token: Option<&str>) -> String {
        token.map(|t| self.decode(t)).unwrap_or_default()
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xor-hex" | "xor" | "hex" => Ok(Self::XorHex),
            "base64" | "b64" => Ok(Self::Base64),
            other => Err(format!("unknown codec '{other}'")),
        }
    }
}

fn xor_with_key(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

fn decode_xor_hex(token: &str) -> Option<String> {
    let bytes = hex::decode(token.trim()).ok()?;
    String::from_utf8(xor_with_key(&bytes)).ok()
}

fn decode_base64(token: &str) -> Option<String> {
    let bytes = STANDARD.decode(token.trim()).ok()?;
    let escaped = String::from_utf8(bytes).ok()?;
    percent_decode_str(&escaped)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "a",
        "https://abcd.supabase.co",
        "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.payload.sig",
        "spaces and ~!*'() punctuation %20 + / = ?",
        "北极星 sovereign",
    ];

    #[test]
    fn both_codecs_round_trip() {
        for codec in [Codec::XorHex, Codec::Base64] {
            for sample in SAMPLES {
                assert_eq!(codec.decode(&codec.encode(sample)), *sample, "{codec:?}");
            }
        }
    }

    #[test]
    fn round_trips_every_printable_ascii_char() {
        let printable: String = (0x20u8..0x7f).map(char::from).collect();
        for codec in [Codec::XorHex, Codec::Base64] {
            assert_eq!(codec.decode(&codec.encode(&printable)), printable);
        }
    }

    #[test]
    fn xor_hex_hides_plaintext() {
        let token = Codec::XorHex.encode("https://abcd.supabase.co");
        assert!(!token.contains("supabase"));
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(token.len(), "https://abcd.supabase.co".len() * 2);
    }

    #[test]
    fn base64_matches_percent_then_base64() {
        // btoa(encodeURIComponent("a b")) == "YSUyMGI="
        assert_eq!(Codec::Base64.encode("a b"), "YSUyMGI=");
    }

    #[test]
    fn decode_fails_soft() {
        for codec in [Codec::XorHex, Codec::Base64] {
            assert_eq!(codec.decode(""), "");
            assert_eq!(codec.decode_opt(None), "");
            assert_eq!(codec.decode("not-a-valid-token"), "");
        }
        // odd-length hex
        assert_eq!(Codec::XorHex.decode("abc"), "");
        // bytes that XOR back into invalid UTF-8
        assert_eq!(Codec::XorHex.decode("af"), "");
        // valid base64 hiding a broken percent escape sequence
        assert_eq!(Codec::Base64.decode(&STANDARD.encode("%E0%A4")), "");
    }

    #[test]
    fn parses_codec_names() {
        assert_eq!("xor-hex".parse::<Codec>(), Ok(Codec::XorHex));
        assert_eq!("BASE64".parse::<Codec>(), Ok(Codec::Base64));
        assert!("rot13".parse::<Codec>().is_err());
    }
}
