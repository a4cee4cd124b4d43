use std::process::ExitCode;

use clap::Parser;
use sip_qa::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::default()
        .filter_or("SIP_QA_LOG", default_level)
        .write_style_or("SIP_QA_LOG_STYLE", "auto");
    env_logger::init_from_env(env);

    match sip_qa::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("sip-qa failed: {err}");
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
