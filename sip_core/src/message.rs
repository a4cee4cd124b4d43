use core::fmt::{self, Write};

use crate::{Result, SipError, DEFAULT_SIP_PORT};

const MAX_FORWARDS: &str = "70";

/// UDP destination of a probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(SipError::Invalid("empty host"));
        }
        if host.chars().any(|c| c.is_whitespace()) {
            return Err(SipError::Invalid("whitespace in host"));
        }
        // IPv6 literals and `host:port` strings; the transport is IPv4 only.
        if host.contains([':', '[', ']']) {
            return Err(SipError::Invalid("host must be a name or IPv4 address"));
        }
        if port == 0 {
            return Err(SipError::Invalid("port 0"));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host`, with `:port` only when the port is not 5060.
    pub fn host_port(&self) -> String {
        let mut out = self.host.clone();
        if self.port != DEFAULT_SIP_PORT {
            let _ = write!(out, ":{}", self.port);
        }
        out
    }

    pub fn uri(&self) -> String {
        format!("sip:{}", self.host_port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Register,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Register => "REGISTER",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: &str) -> Self {
        Header {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A bodiless SIP/2.0 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<Header>,
}

impl Request {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push(Header::new(name, value));
    }

    pub fn push_header(&mut self, header: Header) {
        self.headers.push(header);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{} {} SIP/2.0\r\n", self.method, self.uri);
        for header in &self.headers {
            let _ = write!(out, "{}: {}\r\n", header.name, header.value);
        }
        out.push_str("\r\n");
        out
    }
}

/// Per-request identifiers.
///
/// `call_id` and `local_tag` stay fixed for a dialog; `branch` is fresh for
/// every transmitted request and `cseq` grows within the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestIds<'a> {
    pub call_id: &'a str,
    pub cseq: u32,
    pub branch: &'a str,
    pub local_tag: &'a str,
}

pub fn build_options(
    endpoint: &Endpoint,
    from_uri: &str,
    to_uri: &str,
    user_agent: &str,
    ids: &RequestIds<'_>,
) -> String {
    let mut req = Request::new(Method::Options, &endpoint.uri());
    push_dialog_headers(&mut req, endpoint, from_uri, to_uri, ids);
    req.add_header("Contact", &angle(from_uri));
    req.add_header("User-Agent", user_agent);
    req.add_header("Accept", "application/sdp");
    req.add_header("Content-Length", "0");
    req.render()
}

/// REGISTER for `aor_uri`. `authorization` is either an `Authorization` or a
/// `Proxy-Authorization` header, depending on who challenged.
pub fn build_register(
    endpoint: &Endpoint,
    aor_uri: &str,
    contact_uri: &str,
    user_agent: &str,
    ids: &RequestIds<'_>,
    expires_secs: u32,
    authorization: Option<&Header>,
) -> String {
    let mut req = Request::new(Method::Register, &endpoint.uri());
    push_dialog_headers(&mut req, endpoint, aor_uri, aor_uri, ids);
    req.add_header("Contact", &angle(contact_uri));
    req.add_header("Expires", &expires_secs.to_string());
    if let Some(auth) = authorization {
        req.push_header(auth.clone());
    }
    req.add_header("User-Agent", user_agent);
    req.add_header("Content-Length", "0");
    req.render()
}

fn push_dialog_headers(
    req: &mut Request,
    endpoint: &Endpoint,
    from_uri: &str,
    to_uri: &str,
    ids: &RequestIds<'_>,
) {
    let cseq = format!("{} {}", ids.cseq, req.method);
    req.add_header("Via", &build_via(endpoint, ids.branch));
    req.add_header("Max-Forwards", MAX_FORWARDS);
    req.add_header("From", &format!("{};tag={}", angle(from_uri), ids.local_tag));
    req.add_header("To", &angle(to_uri));
    req.add_header("Call-ID", ids.call_id);
    req.add_header("CSeq", &cseq);
}

fn build_via(endpoint: &Endpoint, branch: &str) -> String {
    format!("SIP/2.0/UDP {};branch={};rport", endpoint.host_port(), branch)
}

fn angle(uri: &str) -> String {
    format!("<{}>", uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_response;

    fn ids() -> RequestIds<'static> {
        RequestIds {
            call_id: "c0ffee@sip-qa",
            cseq: 1,
            branch: "z9hG4bK-0001",
            local_tag: "tag42",
        }
    }

    #[test]
    fn endpoint_uri_omits_default_port() {
        let ep = Endpoint::new("sip.example.com", 5060).unwrap();
        assert_eq!(ep.uri(), "sip:sip.example.com");
        assert_eq!(ep.to_string(), "sip.example.com:5060");

        let ep = Endpoint::new("10.0.0.1", 5080).unwrap();
        assert_eq!(ep.uri(), "sip:10.0.0.1:5080");
        assert_eq!(ep.host_port(), "10.0.0.1:5080");
    }

    #[test]
    fn endpoint_rejects_bad_input() {
        assert!(Endpoint::new("", 5060).is_err());
        assert!(Endpoint::new("bad host", 5060).is_err());
        assert!(Endpoint::new("host", 0).is_err());
        assert_eq!(
            Endpoint::new("::1", 5080),
            Err(SipError::Invalid("host must be a name or IPv4 address"))
        );
        assert!(Endpoint::new("[2001:db8::1]", 5060).is_err());
        assert!(Endpoint::new("pbx.example.com:5080", 5060).is_err());
    }

    #[test]
    fn renders_options() {
        let ep = Endpoint::new("sip.example.com", 5060).unwrap();
        let text = build_options(&ep, "sip:qa@ex.com", "sip:dest@ex.com", "sip-qa/0.1", &ids());

        let mut lines = text.split("\r\n");
        assert_eq!(lines.next(), Some("OPTIONS sip:sip.example.com SIP/2.0"));
        assert_eq!(
            lines.next(),
            Some("Via: SIP/2.0/UDP sip.example.com;branch=z9hG4bK-0001;rport")
        );
        assert!(text.contains("\r\nMax-Forwards: 70\r\n"));
        assert!(text.contains("\r\nFrom: <sip:qa@ex.com>;tag=tag42\r\n"));
        assert!(text.contains("\r\nTo: <sip:dest@ex.com>\r\n"));
        assert!(text.contains("\r\nCall-ID: c0ffee@sip-qa\r\n"));
        assert!(text.contains("\r\nCSeq: 1 OPTIONS\r\n"));
        assert!(text.contains("\r\nContact: <sip:qa@ex.com>\r\n"));
        assert!(text.contains("\r\nUser-Agent: sip-qa/0.1\r\n"));
        assert!(text.contains("\r\nAccept: application/sdp\r\n"));
        assert!(text.ends_with("\r\nContent-Length: 0\r\n\r\n"));
        assert_eq!(text.matches("\r\n\r\n").count(), 1);
    }

    #[test]
    fn renders_register_with_port_and_auth() {
        let ep = Endpoint::new("pbx.example.com", 5080).unwrap();
        let auth = Header::new("Authorization", "Digest username=\"1001\"");
        let ids = RequestIds { cseq: 2, ..ids() };
        let text = build_register(
            &ep,
            "sip:1001@example.com",
            "sip:1001@192.0.2.5",
            "sip-qa/0.1",
            &ids,
            120,
            Some(&auth),
        );

        assert!(text.starts_with("REGISTER sip:pbx.example.com:5080 SIP/2.0\r\n"));
        assert!(text.contains("Via: SIP/2.0/UDP pbx.example.com:5080;branch=z9hG4bK-0001"));
        assert!(text.contains("\r\nFrom: <sip:1001@example.com>;tag=tag42\r\n"));
        assert!(text.contains("\r\nTo: <sip:1001@example.com>\r\n"));
        assert!(text.contains("\r\nCSeq: 2 REGISTER\r\n"));
        assert!(text.contains("\r\nContact: <sip:1001@192.0.2.5>\r\n"));
        assert!(text.contains("\r\nExpires: 120\r\n"));
        assert!(text.contains("\r\nAuthorization: Digest username=\"1001\"\r\n"));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn register_without_auth_has_no_authorization_line() {
        let ep = Endpoint::new("pbx.example.com", 5060).unwrap();
        let text = build_register(&ep, "sip:a@b", "sip:a@c", "ua", &ids(), 300, None);
        assert!(!text.contains("Authorization"));
        assert!(text.contains("\r\nExpires: 300\r\n"));
    }

    #[test]
    fn rendered_request_reads_back_through_the_header_parser() {
        let ep = Endpoint::new("sip.example.com", 5060).unwrap();
        let text = build_options(&ep, "sip:qa@ex.com", "sip:dest@ex.com", "ua", &ids());
        // The response parser does not care about the start line, so reuse it
        // to check the header block is well formed.
        let parsed = parse_response(&text);
        assert_eq!(parsed.status, 0);
        assert_eq!(parsed.header("call-id"), Some("c0ffee@sip-qa"));
        assert_eq!(parsed.header("CSeq"), Some("1 OPTIONS"));
        assert_eq!(parsed.header("content-length"), Some("0"));
        assert!(parsed.header("via").unwrap().contains("branch=z9hG4bK-0001"));
    }
}
