use std::io;
use std::path::PathBuf;

use log::info;
use sip_core::Prober;
use thiserror::Error;

use crate::cli::{Cli, Command, QaArgs};
use crate::report::QaReport;
use crate::transport::UdpTransport;

pub mod cli;
mod paths;
mod report;
mod settings;
mod transport;

pub const APP_NAME: &str = "sip-qa";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("usage: {0}")]
    Usage(String),
    #[error("socket error: {0}")]
    Socket(#[source] io::Error),
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("report encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Usage(_) => 2,
            AppError::Socket(_) => 3,
            AppError::Io { .. } | AppError::Json(_) => 1,
        }
    }
}

pub fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Qa(args) => run_qa(&args),
    }
}

fn run_qa(args: &QaArgs) -> Result<(), AppError> {
    let config = args.probe_config()?;
    let report_path = match &args.report {
        Some(path) => path.clone(),
        None => {
            let dir = paths::app_data_dir();
            paths::ensure_dir(&dir)?;
            dir.join(settings::SETTINGS.report_file)
        }
    };

    let transport = UdpTransport::open().map_err(AppError::Socket)?;
    info!(
        "probing {} (timeout {:?}, {} attempt(s), register: {})",
        config.endpoint,
        config.timeout,
        config.attempts(),
        config.register.is_some()
    );

    let endpoint = config.endpoint.clone();
    let outcome = Prober::new(config, transport).run();

    let report = QaReport::new(&endpoint, outcome);
    report.write_to(&report_path)?;
    info!("report written to {}", report_path.display());

    print!("{}", report.summary(&report_path));
    Ok(())
}
