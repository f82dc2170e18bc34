use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::ExtractError;

/// Token for single-byte Western text that only uses the ISO-8859 range.
pub const TOKEN_ISO_8859: &str = "ISO-8859";
/// Token for single-byte text using the C1 range (0x80..=0x9F) that ISO-8859 leaves unassigned.
pub const TOKEN_NON_ISO: &str = "Non-ISO";
pub const TOKEN_ASCII: &str = "ASCII";

/// How far into a document a `charset=` declaration is searched for.
const META_SCAN_BYTES: usize = 1024;

/// Map a declared charset token to the encoding used for decoding.
///
/// `ISO-8859` and `Non-ISO` both decode as windows-1252, which is a superset of
/// latin1. Other tokens are looked up as encoding labels.
pub fn resolve_charset_token(token: &str) -> Result<&'static Encoding, ExtractError> {
    match token {
        TOKEN_ISO_8859 | TOKEN_NON_ISO => Ok(WINDOWS_1252),
        other => Encoding::for_label(other.trim().as_bytes())
            .ok_or_else(|| ExtractError::UnknownCharset(other.to_string())),
    }
}

/// Guess the declared charset token of an HTML document.
///
/// Order: byte order mark, `charset=` declaration near the top, UTF-8 validity,
/// statistical detection.
pub fn detect_charset_token(bytes: &[u8]) -> String {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding.name().to_string();
    }

    if let Some(encoding) = declared_charset(bytes) {
        return token_for_encoding(encoding, bytes);
    }

    if std::str::from_utf8(bytes).is_ok() {
        return if bytes.is_ascii() {
            TOKEN_ASCII.to_string()
        } else {
            UTF_8.name().to_string()
        };
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    token_for_encoding(detector.guess(None, true), bytes)
}

/// Read `path` and resolve the encoding its bytes should be decoded with.
pub async fn resolve_file_encoding(path: &Path) -> Result<&'static Encoding, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    resolve_charset_token(&detect_charset_token(&bytes))
}

fn token_for_encoding(encoding: &'static Encoding, bytes: &[u8]) -> String {
    if encoding == WINDOWS_1252 || encoding.name().starts_with("ISO-8859") {
        if bytes.iter().any(|b| (0x80..=0x9f).contains(b)) {
            TOKEN_NON_ISO.to_string()
        } else {
            TOKEN_ISO_8859.to_string()
        }
    } else {
        encoding.name().to_string()
    }
}

fn declared_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SCAN_BYTES)];
    let lower = head.to_ascii_lowercase();
    let needle = b"charset=";
    let start = lower
        .windows(needle.len())
        .position(|w| w == needle)?
        + needle.len();
    let label = lower[start..]
        .iter()
        .skip_while(|b| matches!(b, b'"' | b'\''))
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.'))
        .copied()
        .collect::<Vec<u8>>();
    Encoding::for_label(&label)
}
