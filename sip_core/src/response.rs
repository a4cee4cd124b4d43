use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// A parsed SIP response. `status == 0` means the status line was unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SipResponse {
    pub status: u16,
    pub reason: String,
    headers: BTreeMap<String, String>,
    raw: String,
}

impl SipResponse {
    /// Case-insensitive header lookup. Repeated headers come back comma-joined.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Headers keyed by lowercased name.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_parsed(&self) -> bool {
        self.status != 0
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_auth_challenge(&self) -> bool {
        matches!(self.status, 401 | 407)
    }
}

/// Tolerant response parser. Never fails: a bad status line yields status 0,
/// and header lines without a usable name are dropped.
pub fn parse_response(raw: &str) -> SipResponse {
    let mut resp = SipResponse {
        raw: raw.to_string(),
        ..SipResponse::default()
    };

    let mut lines = raw.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
    let Some(start_line) = lines.next() else {
        return resp;
    };
    if let Some((status, reason)) = parse_status_line(start_line) {
        resp.status = status;
        resp.reason = reason.to_string();
    }

    // Folded continuation lines are collected before committing a header.
    let mut pending: Option<(String, String)> = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if line.starts_with(|c: char| c == ' ' || c == '\t') {
            if let Some((_, value)) = pending.as_mut() {
                let more = line.trim();
                if !more.is_empty() {
                    value.push(' ');
                    value.push_str(more);
                }
            }
            continue;
        }
        if let Some((name, value)) = pending.take() {
            insert_header(&mut resp.headers, name, value);
        }
        pending = split_header(line);
    }
    if let Some((name, value)) = pending {
        insert_header(&mut resp.headers, name, value);
    }

    resp
}

fn parse_status_line(line: &str) -> Option<(u16, &str)> {
    let line = line.trim_start();
    let (version, rest) = line.split_once(char::is_whitespace)?;
    if !version.starts_with("SIP/") {
        return None;
    }
    let rest = rest.trim_start();
    let (code, reason) = match rest.split_once(char::is_whitespace) {
        Some((code, reason)) => (code, reason.trim()),
        None => (rest.trim_end(), ""),
    };
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let status = code.parse::<u16>().ok()?;
    Some((status, reason))
}

fn split_header(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name.to_ascii_lowercase(), value.trim().to_string()))
}

fn insert_header(headers: &mut BTreeMap<String, String>, name: String, value: String) {
    match headers.entry(name) {
        Entry::Occupied(mut slot) => {
            let existing = slot.get_mut();
            existing.push_str(", ");
            existing.push_str(&value);
        }
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &str = "SIP/2.0 401 Unauthorized\r\n\
        Via: SIP/2.0/UDP pbx.example.com:5060;branch=z9hG4bK-1;rport=5060\r\n\
        From: <sip:1001@example.com>;tag=abc\r\n\
        To: <sip:1001@example.com>;tag=srv\r\n\
        Call-ID: 1234@sip-qa\r\n\
        CSeq: 1 REGISTER\r\n\
        WWW-Authenticate: Digest realm=\"example.com\", nonce=\"n1\"\r\n\
        Content-Length: 0\r\n\r\n";

    #[test]
    fn parses_status_line_and_headers() {
        let resp = parse_response(CHALLENGE);
        assert_eq!(resp.status, 401);
        assert_eq!(resp.reason, "Unauthorized");
        assert!(resp.is_auth_challenge());
        assert_eq!(resp.header("Call-ID"), Some("1234@sip-qa"));
        assert_eq!(resp.header("cseq"), Some("1 REGISTER"));
        assert_eq!(
            resp.header("www-authenticate"),
            Some("Digest realm=\"example.com\", nonce=\"n1\"")
        );
        assert!(resp.headers().keys().all(|k| k.chars().all(|c| !c.is_ascii_uppercase())));
        assert_eq!(resp.raw(), CHALLENGE);
    }

    #[test]
    fn reason_phrase_keeps_inner_spaces() {
        let resp = parse_response("SIP/2.0 200   Very  OK  \r\n\r\n");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.reason, "Very  OK");
        assert!(resp.is_success());
    }

    #[test]
    fn bare_lf_line_endings_are_accepted() {
        let resp = parse_response("SIP/2.0 100 Trying\nCall-ID: x\n\nbody: ignored\n");
        assert_eq!(resp.status, 100);
        assert_eq!(resp.header("call-id"), Some("x"));
        assert_eq!(resp.header("body"), None);
    }

    #[test]
    fn malformed_status_line_yields_zero() {
        for raw in ["", "garbage", "SIP/2.0 abc Nope", "HTTP/1.1 200 OK", "SIP/2.0 2000 Big"] {
            let resp = parse_response(raw);
            assert_eq!(resp.status, 0, "input: {raw:?}");
            assert!(resp.reason.is_empty());
            assert!(!resp.is_parsed());
        }
    }

    #[test]
    fn headers_survive_a_bad_status_line() {
        let resp = parse_response("junk\r\nCSeq: 1 OPTIONS\r\n\r\n");
        assert_eq!(resp.status, 0);
        assert_eq!(resp.header("cseq"), Some("1 OPTIONS"));
    }

    #[test]
    fn duplicate_headers_are_comma_joined() {
        let resp = parse_response(
            "SIP/2.0 200 OK\r\nVia: a\r\nvia: b\r\nVIA: c\r\n\r\n",
        );
        assert_eq!(resp.header("Via"), Some("a, b, c"));
    }

    #[test]
    fn malformed_header_lines_are_skipped() {
        let resp = parse_response(
            "SIP/2.0 200 OK\r\nno colon here\r\n: empty name\r\nBad Name: x\r\nTo: <sip:a@b>\r\n\r\n",
        );
        assert_eq!(resp.headers().len(), 1);
        assert_eq!(resp.header("to"), Some("<sip:a@b>"));
    }

    #[test]
    fn folded_header_lines_are_joined() {
        let resp = parse_response(
            "SIP/2.0 401 Unauthorized\r\nWWW-Authenticate: Digest realm=\"r\",\r\n  nonce=\"n\"\r\n\r\n",
        );
        assert_eq!(
            resp.header("www-authenticate"),
            Some("Digest realm=\"r\", nonce=\"n\"")
        );
    }

    #[test]
    fn parsing_is_repeatable() {
        assert_eq!(parse_response(CHALLENGE), parse_response(CHALLENGE));
    }
}
