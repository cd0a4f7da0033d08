//! HTML rewriting for iframe embedding.
//!
//! Two edits are made to a fetched page:
//!
//! - `<meta http-equiv>` elements carrying `X-Frame-Options` or
//!   `Content-Security-Policy` are removed
//! - `<base href="{origin}{path}">` is inserted right after the first
//!   `<head>` start tag so relative links resolve against the source site
//!
//! Everything else passes through byte for byte. The proxy's own response
//! gets [`FRAME_HEADERS`] so that only the hosting application can frame it.

use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use tracing::warn;
use url::Url;

/// `X-Frame-Options` value set on proxied responses.
pub const FRAME_OPTIONS: &str = "SAMEORIGIN";

/// `Content-Security-Policy` value set on proxied responses.
pub const FRAME_ANCESTORS: &str = "frame-ancestors 'self'";

/// Response headers for proxied pages.
pub const FRAME_HEADERS: [(&str, &str); 2] = [
    ("x-frame-options", FRAME_OPTIONS),
    ("content-security-policy", FRAME_ANCESTORS),
];

/// `http-equiv` values stripped from upstream pages (compared case-insensitively).
const FRAME_BLOCKING_EQUIV: &[&str] = &["x-frame-options", "content-security-policy"];

/// A rewritten page plus the headers to send with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenPage {
    pub html: String,
    pub headers: [(&'static str, &'static str); 2],
}

/// Stateless rewriter for proxied HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentRewriter;

impl ContentRewriter {
    pub fn new() -> Self {
        Self
    }

    /// Rewrites `html` fetched from `origin`.
    ///
    /// The base tag is skipped when the exact tag is already present, so a
    /// second pass with the same origin leaves the document unchanged.
    /// Documents without a `<head>` get no base tag.
    pub fn rewrite(&self, html: &str, origin: &Url) -> RewrittenPage {
        let base_tag = base_tag(origin);
        let inject = !html.contains(&base_tag);

        let html = match strip_and_inject(html, &base_tag, inject) {
            Ok(rewritten) => rewritten,
            Err(e) => {
                warn!(error = %e, url = %origin, "HTML rewrite failed, passing page through");
                html.to_string()
            }
        };

        RewrittenPage {
            html,
            headers: FRAME_HEADERS,
        }
    }
}

/// `{origin}{path}` for `url`.
pub fn base_href(url: &Url) -> String {
    format!("{}{}", url.origin().ascii_serialization(), url.path())
}

fn base_tag(url: &Url) -> String {
    format!(r#"<base href="{}">"#, escape_attribute(&base_href(url)))
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn is_frame_blocking(http_equiv: &str) -> bool {
    let value = http_equiv.trim();
    FRAME_BLOCKING_EQUIV
        .iter()
        .any(|blocked| value.eq_ignore_ascii_case(blocked))
}

fn strip_and_inject(
    html: &str,
    base_tag: &str,
    inject: bool,
) -> Result<String, lol_html::errors::RewritingError> {
    let mut head_seen = false;

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("meta[http-equiv]", |el| {
                    if el
                        .get_attribute("http-equiv")
                        .is_some_and(|v| is_frame_blocking(&v))
                    {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("head", move |el| {
                    if inject && !head_seen {
                        el.prepend(base_tag, ContentType::Html);
                    }
                    head_seen = true;
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )
}
