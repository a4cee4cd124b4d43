use core::fmt::{self, Write};
use std::collections::BTreeMap;

use crate::{hash::md5_hex, message::Header, Result, SipError, SipResponse};

/// Which header carried the challenge; decides the header name of the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChallengeOrigin {
    #[default]
    WwwAuthenticate,
    ProxyAuthenticate,
}

impl ChallengeOrigin {
    pub fn response_header(&self) -> &'static str {
        match self {
            ChallengeOrigin::WwwAuthenticate => "Authorization",
            ChallengeOrigin::ProxyAuthenticate => "Proxy-Authorization",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    /// `None` when the server offered no qop (or an empty one).
    pub qop: Option<String>,
    pub opaque: Option<String>,
    pub algorithm: String,
    pub origin: ChallengeOrigin,
}

impl DigestChallenge {
    /// The qop token to answer with: `auth` when offered, otherwise the
    /// first listed value.
    pub fn chosen_qop(&self) -> Option<&str> {
        let offered = self.qop.as_deref()?;
        let mut tokens = offered
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .peekable();
        let first = *tokens.peek()?;
        if tokens.any(|t| t.eq_ignore_ascii_case("auth")) {
            Some("auth")
        } else {
            Some(first)
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Digest `nc` value, rendered as eight hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NonceCount(pub u32);

impl NonceCount {
    pub const FIRST: NonceCount = NonceCount(1);
}

impl fmt::Display for NonceCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Finds a usable Digest challenge in the `WWW-Authenticate` header of a
/// 401/407 response. Returns `None` when the header is absent or carries no
/// Digest challenge with both `realm` and `nonce`.
pub fn extract_challenge(resp: &SipResponse) -> Option<DigestChallenge> {
    challenge_from(
        resp.header("www-authenticate")?,
        ChallengeOrigin::WwwAuthenticate,
    )
}

/// Same as [`extract_challenge`] for the `Proxy-Authenticate` header. The
/// answer then goes in `Proxy-Authorization`.
pub fn extract_proxy_challenge(resp: &SipResponse) -> Option<DigestChallenge> {
    challenge_from(
        resp.header("proxy-authenticate")?,
        ChallengeOrigin::ProxyAuthenticate,
    )
}

/// Picks one Digest challenge out of a (possibly merged) header value.
///
/// The first MD5 challenge wins; without one, the first Digest challenge.
fn challenge_from(value: &str, origin: ChallengeOrigin) -> Option<DigestChallenge> {
    let mut digests: Vec<DigestChallenge> = split_challenges(value)
        .into_iter()
        .filter_map(|raw| match parse_www_authenticate(raw) {
            Ok(challenge) => Some(challenge),
            Err(e) => {
                log::debug!("skipping challenge {raw:?}: {e}");
                None
            }
        })
        .collect();

    let pick = digests
        .iter()
        .position(|c| c.algorithm.eq_ignore_ascii_case("MD5"))
        .unwrap_or(0);
    if pick >= digests.len() {
        return None;
    }
    let mut challenge = digests.swap_remove(pick);
    challenge.origin = origin;
    if !challenge.algorithm.eq_ignore_ascii_case("MD5") {
        log::warn!(
            "server asked for algorithm {}; answering with MD5",
            challenge.algorithm
        );
    }
    Some(challenge)
}

/// Splits a header value holding several challenges (`Basic realm="a",
/// Digest realm="b", nonce="c"`) at each scheme token. Commas inside quoted
/// strings do not split.
fn split_challenges(input: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    let mut item_start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                starts.extend(scheme_start(input, item_start, i));
                item_start = i + 1;
            }
            _ => {}
        }
    }
    starts.extend(scheme_start(input, item_start, input.len()));

    let mut out = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(input.len());
        out.push(input[start..end].trim_end().trim_end_matches(',').trim_end());
    }
    out
}

/// Offset of the scheme token when `input[from..to]` opens a new challenge,
/// i.e. reads `<scheme> <key>=...`.
fn scheme_start(input: &str, from: usize, to: usize) -> Option<usize> {
    let item = &input[from..to];
    let trimmed = item.trim_start();
    let (scheme, rest) = trimmed.split_once(char::is_whitespace)?;
    let rest = rest.trim();
    if scheme.contains('=') || rest.is_empty() || rest.starts_with('=') {
        return None;
    }
    Some(from + (item.len() - trimmed.len()))
}

/// Strict parse of a `Digest ...` challenge value.
pub fn parse_www_authenticate(input: &str) -> Result<DigestChallenge> {
    let input = input.trim();
    let (scheme, params) = input
        .split_once(char::is_whitespace)
        .unwrap_or((input, ""));
    if !scheme.eq_ignore_ascii_case("digest") {
        return Err(SipError::Invalid("auth scheme"));
    }

    let mut params = parse_params(params);
    let realm = params.remove("realm").ok_or(SipError::Invalid("realm"))?;
    let nonce = params.remove("nonce").ok_or(SipError::Invalid("nonce"))?;

    Ok(DigestChallenge {
        realm,
        nonce,
        qop: params.remove("qop").filter(|q| !q.trim().is_empty()),
        opaque: params.remove("opaque"),
        algorithm: params
            .remove("algorithm")
            .unwrap_or_else(|| "MD5".to_string()),
        origin: ChallengeOrigin::default(),
    })
}

/// Splits `key=value, key="quoted, value"` into a map with lowercased keys.
///
/// Quoted values run to the next unescaped `"` and may contain commas;
/// unquoted values end at the next comma. The first occurrence of a key wins,
/// and parsing stops where a second challenge (`Digest realm=...`) begins.
fn parse_params(input: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b',') {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b',' {
            i += 1;
        }
        let key = input[key_start..i].trim();
        if i >= bytes.len() || bytes[i] == b',' {
            // bare token without a value
            continue;
        }
        if key.contains(char::is_whitespace) {
            break;
        }
        i += 1;
        while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
            i += 1;
        }

        let value = if i < bytes.len() && bytes[i] == b'"' {
            i += 1;
            let mut value = String::new();
            let mut chunk_start = i;
            while i < bytes.len() && bytes[i] != b'"' {
                if bytes[i] == b'\\' && i + 1 < bytes.len() {
                    value.push_str(&input[chunk_start..i]);
                    chunk_start = i + 1;
                    i += 2;
                    continue;
                }
                i += 1;
            }
            value.push_str(&input[chunk_start..i.min(bytes.len())]);
            // closing quote, then anything up to the separator
            while i < bytes.len() && bytes[i] != b',' {
                i += 1;
            }
            value
        } else {
            let value_start = i;
            while i < bytes.len() && bytes[i] != b',' {
                i += 1;
            }
            input[value_start..i].trim().to_string()
        };

        if !key.is_empty() {
            out.entry(key.to_ascii_lowercase()).or_insert(value);
        }
    }

    out
}

/// Computes the Digest credential string for `method` and `uri`.
///
/// Always answers with MD5. With a qop the `nc`/`cnonce` form is used,
/// otherwise the RFC 2069 compatible `HA1:nonce:HA2` form.
pub fn build_authorization(
    method: &str,
    uri: &str,
    creds: &Credentials,
    challenge: &DigestChallenge,
    cnonce: &str,
    nc: NonceCount,
) -> String {
    let ha1 = md5_hex(format!(
        "{}:{}:{}",
        creds.username, challenge.realm, creds.password
    ));
    let ha2 = md5_hex(format!("{}:{}", method, uri));

    let qop = challenge.chosen_qop();
    let response = match qop {
        Some(qop) => md5_hex(format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, challenge.nonce, nc, cnonce, qop, ha2
        )),
        None => md5_hex(format!("{}:{}:{}", ha1, challenge.nonce, ha2)),
    };

    let mut value = String::new();
    let _ = write!(
        value,
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm=MD5",
        creds.username, challenge.realm, challenge.nonce, uri, response
    );
    if let Some(opaque) = &challenge.opaque {
        let _ = write!(value, ", opaque=\"{}\"", opaque);
    }
    if let Some(qop) = qop {
        let _ = write!(value, ", qop={}, nc={}, cnonce=\"{}\"", qop, nc, cnonce);
    }
    value
}

/// [`build_authorization`] wrapped in the header the challenger expects.
pub fn authorization_header(
    method: &str,
    uri: &str,
    creds: &Credentials,
    challenge: &DigestChallenge,
    cnonce: &str,
    nc: NonceCount,
) -> Header {
    let value = build_authorization(method, uri, creds, challenge, cnonce, nc);
    Header::new(challenge.origin.response_header(), &value)
}
