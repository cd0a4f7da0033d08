//! Character set detection for fetched pages.
//!
//! Upstream pages are decoded to UTF-8 before they are inspected or
//! rewritten. The encoding is taken from, in order:
//!
//! 1. a byte order mark
//! 2. the `charset` parameter of the `Content-Type` header
//! 3. a `<meta charset>` or `<meta http-equiv="Content-Type">` declaration
//!    in the first [`META_SCAN_BYTES`] bytes
//! 4. UTF-8

use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252, X_USER_DEFINED};
use regex::bytes::Regex;

/// How far into the document a meta declaration is looked for.
pub const META_SCAN_BYTES: usize = 1024;

/// A page body decoded to UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPage {
    pub html: String,
    /// Encoding the upstream bytes were in.
    pub encoding: &'static Encoding,
    /// Some input bytes were not valid in that encoding.
    pub had_errors: bool,
}

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)<meta[^>]*?charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#)
        .expect("Invalid regex pattern")
});

/// Encoding named by a `Content-Type` header value, if any.
pub fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| {
            Encoding::for_label(value.trim().trim_matches(['"', '\'']).as_bytes())
        })
}

/// Encoding declared by a meta tag near the start of `body`, if any.
pub fn charset_from_meta(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(META_SCAN_BYTES)];
    let label = META_CHARSET.captures(head)?.get(1)?.as_bytes();

    // A document that reached us as bytes cannot really be UTF-16, and
    // x-user-defined means windows-1252 when declared in markup.
    Encoding::for_label(label).map(|encoding| {
        if encoding == UTF_16LE || encoding == UTF_16BE {
            UTF_8
        } else if encoding == X_USER_DEFINED {
            WINDOWS_1252
        } else {
            encoding
        }
    })
}

/// Decodes `body` using the header, markup or default encoding.
pub fn decode_html(body: &[u8], content_type: Option<&str>) -> DecodedPage {
    let declared = content_type
        .and_then(charset_from_content_type)
        .or_else(|| charset_from_meta(body))
        .unwrap_or(UTF_8);

    // A BOM overrides the declared encoding
    let (html, encoding, had_errors) = declared.decode(body);

    DecodedPage {
        html: html.into_owned(),
        encoding,
        had_errors,
    }
}
