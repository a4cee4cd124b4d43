//! OPTIONS liveness probe followed by an optional REGISTER with one digest
//! challenge round-trip.

use core::fmt;
use std::time::Duration;

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::RngCore;
use serde::Serialize;

use crate::{
    auth::{
        authorization_header, extract_challenge, extract_proxy_challenge, Credentials, NonceCount,
    },
    ids::IdGenerator,
    message::{build_options, build_register, Endpoint, Method, RequestIds},
    response::{parse_response, SipResponse},
    transport::{Reply, Transport},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1200);
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_USER_AGENT: &str = "sip-qa";
pub const DEFAULT_EXPIRES_SECS: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterConfig {
    pub aor_uri: String,
    pub contact_uri: String,
    pub credentials: Credentials,
    pub expires_secs: u32,
    /// Also answer a `Proxy-Authenticate` challenge when the response has no
    /// `WWW-Authenticate`. Off by default.
    pub answer_proxy_challenge: bool,
}

impl RegisterConfig {
    pub fn new(
        aor_uri: impl Into<String>,
        contact_uri: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            aor_uri: aor_uri.into(),
            contact_uri: contact_uri.into(),
            credentials,
            expires_secs: DEFAULT_EXPIRES_SECS,
            answer_proxy_challenge: false,
        }
    }

    pub fn with_expires(mut self, secs: u32) -> Self {
        self.expires_secs = secs;
        self
    }

    pub fn with_proxy_challenge(mut self, answer: bool) -> Self {
        self.answer_proxy_challenge = answer;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub endpoint: Endpoint,
    pub from_uri: String,
    pub to_uri: String,
    pub user_agent: String,
    /// Wait per attempt.
    pub timeout: Duration,
    /// Extra attempts after the first one.
    pub retries: u32,
    pub register: Option<RegisterConfig>,
}

impl ProbeConfig {
    pub fn new(endpoint: Endpoint, from_uri: impl Into<String>, to_uri: impl Into<String>) -> Self {
        Self {
            endpoint,
            from_uri: from_uri.into(),
            to_uri: to_uri.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            register: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_register(mut self, register: RegisterConfig) -> Self {
        self.register = Some(register);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeState {
    #[default]
    Start,
    OptionsPending,
    OptionsDone,
    RegisterPending,
    RegisterDone,
    AuthPending,
    AuthDone,
}

/// Why a probe ended unsuccessfully. `Display` gives the report note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    TransportTimeout,
    UnparseableStatusLine,
    MissingOrInvalidChallenge,
    AuthRetryTimeout,
    AuthenticationRejected,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeFailure::TransportTimeout => "no reply (timeout)",
            ProbeFailure::UnparseableStatusLine => "unparseable status line",
            ProbeFailure::MissingOrInvalidChallenge => "401/407 but no parsable challenge",
            ProbeFailure::AuthRetryTimeout => "auth retry timed out",
            ProbeFailure::AuthenticationRejected => "credentials rejected",
        })
    }
}

/// Result of one OPTIONS or REGISTER attempt chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    #[serde(rename = "ok")]
    pub succeeded: bool,
    pub status: u16,
    /// -1 when nothing came back.
    #[serde(rename = "rtt_ms")]
    pub round_trip_ms: i64,
    pub peer_ip: String,
    pub peer_port: u16,
    pub note: String,
}

impl Default for ProbeOutcome {
    fn default() -> Self {
        Self {
            succeeded: false,
            status: 0,
            round_trip_ms: -1,
            peer_ip: String::new(),
            peer_port: 0,
            note: String::new(),
        }
    }
}

impl ProbeOutcome {
    pub fn failed(failure: ProbeFailure) -> Self {
        Self {
            note: failure.to_string(),
            ..Self::default()
        }
    }

    fn from_reply(reply: &Reply, resp: &SipResponse, succeeded: bool) -> Self {
        let note = if resp.is_parsed() {
            resp.reason.clone()
        } else {
            ProbeFailure::UnparseableStatusLine.to_string()
        };
        Self {
            succeeded,
            status: resp.status,
            round_trip_ms: reply.elapsed_ms(),
            peer_ip: reply.peer_ip.clone(),
            peer_port: reply.peer_port,
            note,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub options: ProbeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register: Option<ProbeOutcome>,
}

/// Call-ID and tag are fixed per dialog; CSeq only moves forward.
struct Dialog {
    call_id: String,
    local_tag: String,
    cseq: u32,
}

impl Dialog {
    fn open<R: RngCore>(ids: &mut IdGenerator<R>) -> Self {
        Self {
            call_id: ids.call_id(),
            local_tag: ids.tag(),
            cseq: 1,
        }
    }

    fn ids<'a>(&'a self, branch: &'a str) -> RequestIds<'a> {
        RequestIds {
            call_id: &self.call_id,
            cseq: self.cseq,
            branch,
            local_tag: &self.local_tag,
        }
    }
}

struct Link<T, R> {
    transport: T,
    ids: IdGenerator<R>,
}

impl<T: Transport, R: RngCore> Link<T, R> {
    /// Up to `retries + 1` sends, each rendered with a fresh branch.
    ///
    /// Only a reply that belongs to this chain ends it; anything else is
    /// dropped and the wait goes on for what is left of the attempt timeout.
    fn send_with_retry(
        &mut self,
        config: &ProbeConfig,
        method: Method,
        dialog: &Dialog,
        render: impl Fn(&RequestIds<'_>) -> String,
    ) -> Option<(Reply, SipResponse)> {
        let attempts = config.attempts();
        let mut branches = Vec::with_capacity(attempts as usize);
        for attempt in 1..=attempts {
            let branch = self.ids.branch();
            let payload = render(&dialog.ids(&branch));
            debug!(
                "{method} attempt {attempt}/{attempts} to {} (branch {branch})",
                config.endpoint
            );
            branches.push(branch);

            let mut waited = Duration::ZERO;
            let mut next =
                self.transport
                    .send_and_await_reply(&config.endpoint, payload.as_bytes(), config.timeout);
            while let Some(mut reply) = next {
                reply.elapsed += waited;
                let resp = parse_response(&reply.text());
                let Some(mismatch) = stray_reason(&resp, dialog, method, &branches) else {
                    debug!(
                        "{method} reply from {}:{} after {} ms",
                        reply.peer_ip,
                        reply.peer_port,
                        reply.elapsed_ms()
                    );
                    return Some((reply, resp));
                };
                debug!(
                    "{method}: ignoring reply from {}:{} with foreign {mismatch}",
                    reply.peer_ip, reply.peer_port
                );
                waited = reply.elapsed;
                next = match config.timeout.checked_sub(waited) {
                    Some(left) if !left.is_zero() => self.transport.await_reply(left),
                    _ => None,
                };
            }
            debug!("{method} attempt {attempt} got no reply within {:?}", config.timeout);
        }
        warn!("{method}: no reply from {} after {attempts} attempt(s)", config.endpoint);
        None
    }
}

/// Names the header showing that `resp` answers some other request.
///
/// Headers the reply leaves out are not held against it.
fn stray_reason(
    resp: &SipResponse,
    dialog: &Dialog,
    method: Method,
    branches: &[String],
) -> Option<&'static str> {
    if let Some(call_id) = resp.header("call-id") {
        if call_id.trim() != dialog.call_id {
            return Some("Call-ID");
        }
    }
    if let Some(cseq) = resp.header("cseq") {
        let mut parts = cseq.split_whitespace();
        let seq_matches = parts.next().and_then(|n| n.parse::<u32>().ok()) == Some(dialog.cseq);
        let method_matches = parts
            .next()
            .is_some_and(|m| m.eq_ignore_ascii_case(method.as_str()));
        if !(seq_matches && method_matches) {
            return Some("CSeq");
        }
    }
    if let Some(branch) = resp.header("via").and_then(top_via_branch) {
        if !branches.iter().any(|sent| sent == branch) {
            return Some("Via branch");
        }
    }
    None
}

/// `branch` parameter of the topmost Via entry.
fn top_via_branch(via: &str) -> Option<&str> {
    via.split(',').next()?.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("branch")
            .then(|| value.trim())
    })
}

/// Drives the OPTIONS and REGISTER probes against one endpoint.
pub struct Prober<T, R = StdRng> {
    config: ProbeConfig,
    link: Link<T, R>,
    state: ProbeState,
}

impl<T: Transport> Prober<T, StdRng> {
    pub fn new(config: ProbeConfig, transport: T) -> Self {
        Self::with_ids(config, transport, IdGenerator::from_os_rng())
    }
}

impl<T: Transport, R: RngCore> Prober<T, R> {
    pub fn with_rng(config: ProbeConfig, transport: T, rng: R) -> Self {
        Self::with_ids(config, transport, IdGenerator::new(rng))
    }

    fn with_ids(config: ProbeConfig, transport: T, ids: IdGenerator<R>) -> Self {
        Self {
            config,
            link: Link { transport, ids },
            state: ProbeState::Start,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn into_transport(self) -> T {
        self.link.transport
    }

    /// OPTIONS first, then REGISTER when configured. Never fails; problems
    /// end up in the outcome notes.
    pub fn run(&mut self) -> ProbeReport {
        self.state = ProbeState::Start;

        let options = self.probe_options();
        info!(
            "OPTIONS {}: status={} rtt_ms={} ({})",
            verdict(&options),
            options.status,
            options.round_trip_ms,
            options.note
        );

        let register = self.config.register.clone().map(|reg| {
            let outcome = self.probe_register(&reg);
            info!(
                "REGISTER {}: status={} rtt_ms={} ({})",
                verdict(&outcome),
                outcome.status,
                outcome.round_trip_ms,
                outcome.note
            );
            outcome
        });

        ProbeReport { options, register }
    }

    fn probe_options(&mut self) -> ProbeOutcome {
        enter(&mut self.state, ProbeState::OptionsPending);

        let config = &self.config;
        let dialog = Dialog::open(&mut self.link.ids);
        let reply = self.link.send_with_retry(config, Method::Options, &dialog, |ids| {
            build_options(
                &config.endpoint,
                &config.from_uri,
                &config.to_uri,
                &config.user_agent,
                ids,
            )
        });

        enter(&mut self.state, ProbeState::OptionsDone);
        let Some((reply, resp)) = reply else {
            return ProbeOutcome::failed(ProbeFailure::TransportTimeout);
        };
        trace!("OPTIONS response:\n{}", resp.raw());
        // Any status line at all proves the endpoint is alive.
        ProbeOutcome::from_reply(&reply, &resp, resp.status >= 100)
    }

    fn probe_register(&mut self, reg: &RegisterConfig) -> ProbeOutcome {
        enter(&mut self.state, ProbeState::RegisterPending);

        let config = &self.config;
        let mut dialog = Dialog::open(&mut self.link.ids);
        let first = self.link.send_with_retry(config, Method::Register, &dialog, |ids| {
            build_register(
                &config.endpoint,
                &reg.aor_uri,
                &reg.contact_uri,
                &config.user_agent,
                ids,
                reg.expires_secs,
                None,
            )
        });

        let Some((first, resp)) = first else {
            enter(&mut self.state, ProbeState::RegisterDone);
            return ProbeOutcome::failed(ProbeFailure::TransportTimeout);
        };
        trace!("REGISTER response:\n{}", resp.raw());

        if !resp.is_auth_challenge() {
            enter(&mut self.state, ProbeState::RegisterDone);
            return ProbeOutcome::from_reply(&first, &resp, resp.is_success());
        }

        let challenge = extract_challenge(&resp).or_else(|| {
            if reg.answer_proxy_challenge {
                extract_proxy_challenge(&resp)
            } else {
                None
            }
        });
        let Some(challenge) = challenge else {
            enter(&mut self.state, ProbeState::RegisterDone);
            return ProbeOutcome {
                note: ProbeFailure::MissingOrInvalidChallenge.to_string(),
                ..ProbeOutcome::from_reply(&first, &resp, false)
            };
        };

        enter(&mut self.state, ProbeState::AuthPending);
        debug!(
            "{} challenge for realm {:?}, qop {:?}",
            resp.status, challenge.realm, challenge.qop
        );
        let cnonce = self.link.ids.cnonce();
        let authorization = authorization_header(
            Method::Register.as_str(),
            &config.endpoint.uri(),
            &reg.credentials,
            &challenge,
            &cnonce,
            NonceCount::FIRST,
        );
        dialog.cseq += 1;

        let second = self.link.send_with_retry(config, Method::Register, &dialog, |ids| {
            build_register(
                &config.endpoint,
                &reg.aor_uri,
                &reg.contact_uri,
                &config.user_agent,
                ids,
                reg.expires_secs,
                Some(&authorization),
            )
        });

        enter(&mut self.state, ProbeState::AuthDone);
        let Some((second, resp)) = second else {
            return ProbeOutcome {
                note: ProbeFailure::AuthRetryTimeout.to_string(),
                ..ProbeOutcome::from_reply(&first, &resp, false)
            };
        };
        trace!("authenticated REGISTER response:\n{}", resp.raw());

        let mut outcome = ProbeOutcome::from_reply(&second, &resp, resp.is_success());
        if resp.is_auth_challenge() {
            outcome.note = format!("{}: {}", ProbeFailure::AuthenticationRejected, resp.reason);
        }
        outcome
    }
}

fn enter(state: &mut ProbeState, next: ProbeState) {
    debug!("probe state {:?} -> {:?}", state, next);
    *state = next;
}

fn verdict(outcome: &ProbeOutcome) -> &'static str {
    if outcome.succeeded {
        "OK"
    } else {
        "FAIL"
    }
}
