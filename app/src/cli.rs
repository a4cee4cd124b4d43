// Command-line interface (clap derive)
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use sip_core::{Credentials, Endpoint, ProbeConfig, RegisterConfig};

use crate::settings::SETTINGS;
use crate::AppError;

/// SIP endpoint QA probe: OPTIONS liveness check plus optional REGISTER.
#[derive(Parser, Debug)]
#[command(name = "sip-qa", version, arg_required_else_help = true)]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe one SIP endpoint over UDP and write a JSON report
    #[command(after_help = "Examples:\n  \
        sip-qa qa --host sip.example.com --from sip:qa@ex.com --to sip:qa@ex.com\n  \
        sip-qa qa --host sip.example.com --from sip:qa@ex.com --to sip:qa@ex.com \\\n      \
        --register --aor sip:1001@example.com --contact sip:1001@sip.example.com \\\n      \
        --user 1001 --pass secret --expires 120")]
    Qa(QaArgs),
}

#[derive(Args, Debug, Clone)]
pub struct QaArgs {
    /// Target host name or IPv4 address
    #[arg(long)]
    pub host: Option<String>,
    /// Target UDP port
    #[arg(long, default_value_t = SETTINGS.default_port)]
    pub port: u16,
    /// Per-attempt reply timeout in milliseconds
    #[arg(long = "timeout", default_value_t = SETTINGS.timeout_ms,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: u64,
    /// Extra attempts after the first one
    #[arg(long, default_value_t = SETTINGS.retries)]
    pub retries: u32,
    /// From URI of the OPTIONS probe
    #[arg(long)]
    pub from: Option<String>,
    /// To URI of the OPTIONS probe
    #[arg(long)]
    pub to: Option<String>,

    /// Also send a REGISTER (answers one digest challenge)
    #[arg(long)]
    pub register: bool,
    /// Address-of-record to register
    #[arg(long)]
    pub aor: Option<String>,
    /// Contact URI to bind
    #[arg(long)]
    pub contact: Option<String>,
    /// Digest username
    #[arg(long)]
    pub user: Option<String>,
    /// Digest password
    #[arg(long = "pass")]
    pub password: Option<String>,
    /// Requested registration lifetime in seconds
    #[arg(long, default_value_t = SETTINGS.expires)]
    pub expires: u32,
    /// Also answer a 407 that only carries Proxy-Authenticate
    #[arg(long)]
    pub proxy_auth: bool,

    /// Report path (defaults to the per-user data directory)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl QaArgs {
    pub fn probe_config(&self) -> Result<ProbeConfig, AppError> {
        let (Some(host), Some(from), Some(to)) = (
            non_empty(&self.host),
            non_empty(&self.from),
            non_empty(&self.to),
        ) else {
            return Err(AppError::Usage(
                "missing required args: --host --from --to".to_string(),
            ));
        };

        let endpoint = Endpoint::new(host, self.port)
            .map_err(|e| AppError::Usage(format!("bad target {host}:{}: {e}", self.port)))?;

        let mut config = ProbeConfig::new(endpoint, from, to)
            .with_user_agent(user_agent())
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_retries(self.retries);

        if self.register {
            let (Some(aor), Some(contact), Some(user), Some(password)) = (
                non_empty(&self.aor),
                non_empty(&self.contact),
                non_empty(&self.user),
                non_empty(&self.password),
            ) else {
                return Err(AppError::Usage(
                    "--register requires --aor --contact --user --pass".to_string(),
                ));
            };
            config = config.with_register(
                RegisterConfig::new(aor, contact, Credentials::new(user, password))
                    .with_expires(self.expires)
                    .with_proxy_challenge(self.proxy_auth),
            );
        }

        Ok(config)
    }
}

pub fn user_agent() -> String {
    format!("{}/{}", SETTINGS.user_agent, env!("CARGO_PKG_VERSION"))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
