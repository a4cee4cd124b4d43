//! Compile-time defaults loaded via `toml-cfg`.
//!
//! Override them in a `cfg.toml` next to the workspace manifest:
//!
//! ```toml
//! [sip_qa]
//! timeout_ms = 2000
//! user_agent = "lab-probe"
//! ```

#[toml_cfg::toml_config]
pub struct Settings {
    #[default(5060)]
    pub default_port: u16,
    #[default(1200)]
    pub timeout_ms: u64,
    #[default(2)]
    pub retries: u32,
    #[default(300)]
    pub expires: u32,
    #[default("sip-qa")]
    pub user_agent: &'static str,
    #[default("sip_qa_report.json")]
    pub report_file: &'static str,
}
