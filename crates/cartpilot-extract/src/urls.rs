//! Link normalization: redirect unwrapping, bounded percent-decoding,
//! absolutization, and scheme validation.

use std::borrow::Cow;
use std::sync::LazyLock;

use cartpilot_core::Platform;
use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

/// Query parameters that tracking and ad wrappers use to carry the real target.
const REDIRECT_PARAMS: &[&str] = &["url", "link", "redirect", "target", "u"];

/// Upper bound on percent-decode passes, so malformed encodings terminate.
const MAX_DECODE_PASSES: usize = 3;

/// Upper bound on nested redirect wrappers.
const MAX_UNWRAPS: usize = 3;

static DUPLICATE_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/{2,}").expect("valid regex"));

/// Scheme and host of `url`, e.g. `https://www.flipkart.com`.
#[must_use]
pub fn page_origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    Some(parsed.origin().ascii_serialization())
}

/// Normalizes a raw `href` into an absolute `http(s)` product URL.
///
/// `base` is the page URL (or origin) the link was found on; when absent the
/// platform's default origin is used. Returns `None` when the link cannot be
/// turned into a navigable `http(s)` URL.
#[must_use]
pub fn normalize_link(raw: &str, base: Option<&str>, platform: Platform) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with("tel:")
    {
        return None;
    }

    let base = base
        .and_then(|b| Url::parse(b).ok())
        .or_else(|| platform.default_origin().and_then(|o| Url::parse(o).ok()));

    let mut resolved = resolve(raw, base.as_ref())?;
    for _ in 0..MAX_UNWRAPS {
        match unwrap_redirect(&resolved) {
            Some(target) => resolved = resolve(&target, Some(&resolved))?,
            None => break,
        }
    }

    if !matches!(resolved.scheme(), "http" | "https") || resolved.host_str().is_none() {
        return None;
    }

    let collapsed = DUPLICATE_SLASHES.replace_all(resolved.path(), "/").into_owned();
    resolved.set_path(&collapsed);
    Some(resolved.to_string())
}

/// Decodes `%XX` sequences repeatedly until the text stops changing, at most
/// [`MAX_DECODE_PASSES`] times.
#[must_use]
pub fn decode_bounded(text: &str) -> String {
    let mut current = text.to_owned();
    for _ in 0..MAX_DECODE_PASSES {
        let decoded = match percent_decode_str(&current).decode_utf8_lossy() {
            Cow::Borrowed(_) => break,
            Cow::Owned(decoded) => decoded,
        };
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}

fn resolve(raw: &str, base: Option<&Url>) -> Option<Url> {
    if raw.starts_with("//") {
        let scheme = base.map_or("https", Url::scheme);
        return Url::parse(&format!("{scheme}:{raw}")).ok();
    }
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(raw).ok(),
        Err(_) => None,
    }
}

/// The wrapped destination of a redirect/tracking URL, if `url` is one.
fn unwrap_redirect(url: &Url) -> Option<String> {
    let candidate = REDIRECT_PARAMS.iter().find_map(|param| {
        url.query_pairs()
            .find(|(key, value)| key.eq_ignore_ascii_case(param) && !value.trim().is_empty())
            .map(|(_, value)| value.into_owned())
    })?;

    let decoded = decode_bounded(candidate.trim());
    let lower = decoded.to_ascii_lowercase();
    let looks_like_target = lower.starts_with("http://")
        || lower.starts_with("https://")
        || decoded.starts_with('/');
    looks_like_target.then_some(decoded)
}
