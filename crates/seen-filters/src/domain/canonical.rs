//! URL canonicalization
//!
//! Every key that goes into a filter, and every key that is tested against
//! one, passes through [`canonicalize`] first. The published snapshots were
//! built with the same pipeline, so any drift here turns into silent false
//! negatives.
//!
//! Stage order matters. Each stage assumes the earlier ones already ran:
//!
//! 1. drop the fragment
//! 2. drop tracking query parameters
//! 3. unwrap archive mirror links and restart on the original URL
//! 4. strip `index.html`, `index.php` and trailing `/` from the path
//! 5. strip leading `www.` from the host
//! 6. host-specific rules (video host, marketplace, mobile encyclopedia)
//! 7. drop the scheme and render as `//host[:port]path[?query]`

use std::fmt;

use url::form_urlencoded;
use url::Url;

use crate::error::FilterError;

/// Query parameters removed by exact name.
pub const TRACKING_PARAMS: [&str; 6] = ["ref", "sms_ss", "gclid", "fbclid", "at_xt", "_r"];

/// Query parameters removed by prefix.
pub const TRACKING_PREFIX: &str = "utm_";

const ARCHIVE_HOST: &str = "web.archive.org";
const ARCHIVE_PATH_PREFIX: &str = "/web/";
const MAX_ARCHIVE_DEPTH: usize = 4;

const VIDEO_HOST: &str = "youtube.com";
const VIDEO_SHORT_HOST: &str = "youtu.be";
const MARKETPLACE_HOST: &str = "amazon.com";
const MOBILE_WIKI_HOST: &str = "en.m.wikipedia.org";
const WIKI_HOST: &str = "en.wikipedia.org";

/// Normalized key used for every filter insert and query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<[u8]> for CanonicalKey {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Decomposed URL the pipeline stages operate on.
#[derive(Clone, Debug, PartialEq, Eq)]
struct UrlParts {
    host: String,
    port: Option<u16>,
    path: String,
    query: Vec<(String, String)>,
}

/// Normalize `raw` into the key format used by the published filters.
///
/// Accepts absolute `http`/`https` URLs and scheme-relative `//host/...`
/// input, so the output of this function can be fed back into it.
pub fn canonicalize(raw: &str) -> Result<CanonicalKey, FilterError> {
    canonicalize_depth(raw, 0)
}

fn canonicalize_depth(raw: &str, depth: usize) -> Result<CanonicalKey, FilterError> {
    // Stage 1: the fragment never makes it into `UrlParts`
    let mut parts = parse_web_url(raw)?;

    strip_tracking_params(&mut parts);

    if let Some(original) = archived_original(&parts) {
        if depth >= MAX_ARCHIVE_DEPTH {
            return Err(malformed(raw, "archive links nested too deeply"));
        }
        return canonicalize_depth(&original, depth + 1);
    }

    strip_index_and_slash(&mut parts);
    strip_www(&mut parts);
    apply_host_rules(&mut parts);

    Ok(CanonicalKey(render(&parts)))
}

fn malformed(raw: &str, reason: impl Into<String>) -> FilterError {
    FilterError::MalformedUrl {
        url: raw.to_string(),
        reason: reason.into(),
    }
}

fn parse_web_url(raw: &str) -> Result<UrlParts, FilterError> {
    let trimmed = raw.trim();
    let (parsed, port) = if trimmed.starts_with("//") {
        // No scheme to judge the port by. An explicit port survives
        // parsing under whichever web scheme it is not the default of.
        let as_http =
            Url::parse(&format!("http:{}", trimmed)).map_err(|e| malformed(raw, e.to_string()))?;
        let https_port = Url::parse(&format!("https:{}", trimmed))
            .ok()
            .and_then(|u| u.port());
        let port = as_http.port().or(https_port);
        (as_http, port)
    } else {
        let parsed = Url::parse(trimmed).map_err(|e| malformed(raw, e.to_string()))?;
        // `port()` is `None` for the scheme's own default port.
        let port = parsed.port();
        (parsed, port)
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(malformed(
            raw,
            format!("unsupported scheme {:?}", parsed.scheme()),
        ));
    }

    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return Err(malformed(raw, "no host")),
    };

    Ok(UrlParts {
        host,
        port,
        path: parsed.path().to_string(),
        query: parsed.query_pairs().into_owned().collect(),
    })
}

fn is_tracking_param(name: &str) -> bool {
    TRACKING_PARAMS.contains(&name) || name.starts_with(TRACKING_PREFIX)
}

fn strip_tracking_params(parts: &mut UrlParts) {
    parts.query.retain(|(name, _)| !is_tracking_param(name));
}

/// Original URL embedded in an archive mirror link, with the outer query
/// re-attached.
fn archived_original(parts: &UrlParts) -> Option<String> {
    if parts.host != ARCHIVE_HOST {
        return None;
    }
    let rest = parts.path.strip_prefix(ARCHIVE_PATH_PREFIX)?;
    let (stamp, original) = rest.split_once('/')?;
    if !is_archive_stamp(stamp) || original.is_empty() {
        return None;
    }

    let mut url = if original.contains("://") || original.starts_with("//") {
        original.to_string()
    } else {
        format!("http://{}", original)
    };
    if !parts.query.is_empty() {
        url.push('?');
        url.push_str(&encode_query(&parts.query));
    }
    Some(url)
}

/// `<digits>` optionally followed by a flag suffix such as `id_` or `if_`.
fn is_archive_stamp(stamp: &str) -> bool {
    let digits = stamp.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    let flags = &stamp[digits..];
    flags.is_empty()
        || (flags.ends_with('_')
            && flags[..flags.len() - 1]
                .bytes()
                .all(|b| b.is_ascii_lowercase()))
}

fn strip_index_and_slash(parts: &mut UrlParts) {
    loop {
        let path = &parts.path;
        let stripped = path
            .strip_suffix("index.html")
            .or_else(|| path.strip_suffix("index.php"))
            .or_else(|| path.strip_suffix('/'));
        match stripped {
            Some(shorter) if ends_with_dot_segment(shorter) => {
                parts.path = resolve_dot_segments(shorter)
            }
            Some(shorter) => parts.path = shorter.to_string(),
            None => break,
        }
    }
}

/// Stripping `index.html` from `/a/..index.html` leaves `/a/..`, which a
/// URL parser would collapse on the next pass.
fn ends_with_dot_segment(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or("").to_ascii_lowercase();
    matches!(last.as_str(), "." | ".." | "%2e" | ".%2e" | "%2e." | "%2e%2e")
}

fn resolve_dot_segments(path: &str) -> String {
    match Url::parse("http://resolve.invalid/") {
        Ok(mut base) => {
            base.set_path(path);
            base.path().to_string()
        }
        Err(_) => path.to_string(),
    }
}

fn strip_www(parts: &mut UrlParts) {
    while let Some(rest) = parts.host.strip_prefix("www.") {
        if rest.is_empty() {
            break;
        }
        parts.host = rest.to_string();
    }
}

fn apply_host_rules(parts: &mut UrlParts) {
    if parts.host == VIDEO_SHORT_HOST {
        let id = parts.path.trim_matches('/').to_string();
        if !id.is_empty() {
            parts.host = VIDEO_HOST.to_string();
            parts.path = "/watch".to_string();
            parts.query.retain(|(name, _)| name != "v");
            parts.query.insert(0, ("v".to_string(), id));
        }
    }

    if parts.host == VIDEO_HOST {
        if parts.query.iter().any(|(name, _)| name == "v") {
            parts.query.retain(|(name, _)| name == "v");
        } else if parts.query.iter().any(|(name, _)| name == "list") {
            parts.query.retain(|(name, _)| name == "list");
        }
    }

    if parts.host == MARKETPLACE_HOST {
        parts.query.clear();
    }

    if parts.host == MOBILE_WIKI_HOST {
        parts.host = WIKI_HOST.to_string();
    }
}

fn encode_query(query: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query)
        .finish()
}

fn render(parts: &UrlParts) -> String {
    let mut out = String::with_capacity(2 + parts.host.len() + parts.path.len());
    out.push_str("//");
    out.push_str(&parts.host);
    if let Some(port) = parts.port {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(&parts.path);
    if !parts.query.is_empty() {
        out.push('?');
        out.push_str(&encode_query(&parts.query));
    }
    out
}
