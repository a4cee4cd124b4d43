use std::fs;
use std::path::Path;

use serde::Serialize;
use sip_core::{Endpoint, ProbeOutcome, ProbeReport};

use crate::{AppError, APP_NAME};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

/// Everything written to the JSON report file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaReport {
    pub app: &'static str,
    pub version: &'static str,
    pub os: &'static str,
    pub target: Target,
    pub options: ProbeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register: Option<ProbeOutcome>,
}

impl QaReport {
    pub fn new(endpoint: &Endpoint, probe: ProbeReport) -> Self {
        Self {
            app: APP_NAME,
            version: env!("CARGO_PKG_VERSION"),
            os: os_name(),
            target: Target {
                host: endpoint.host().to_string(),
                port: endpoint.port(),
            },
            options: probe.options,
            register: probe.register,
        }
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), AppError> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| AppError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Console summary, one line per probe.
    pub fn summary(&self, report_path: &Path) -> String {
        let mut out = format!("SIP QA report: {}\n", report_path.display());
        out.push_str(&summary_line("OPTIONS", &self.options));
        if let Some(register) = &self.register {
            out.push_str(&summary_line("REGISTER", register));
        }
        out
    }
}

fn summary_line(label: &str, outcome: &ProbeOutcome) -> String {
    format!(
        "{}: {} status={} rtt_ms={} peer={}:{} ({})\n",
        label,
        if outcome.succeeded { "OK" } else { "FAIL" },
        outcome.status,
        outcome.round_trip_ms,
        outcome.peer_ip,
        outcome.peer_port,
        outcome.note
    )
}

pub fn os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "Windows"
    } else if cfg!(target_os = "macos") {
        "macOS"
    } else if cfg!(target_os = "linux") {
        "Linux"
    } else {
        "Unknown"
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use sip_core::ProbeFailure;

    use super::*;

    fn ok_outcome() -> ProbeOutcome {
        ProbeOutcome {
            succeeded: true,
            status: 200,
            round_trip_ms: 31,
            peer_ip: "192.0.2.10".to_string(),
            peer_port: 5060,
            note: "OK".to_string(),
        }
    }

    fn report(register: Option<ProbeOutcome>) -> QaReport {
        let endpoint = Endpoint::new("sip.example.com", 5060).unwrap();
        QaReport::new(
            &endpoint,
            ProbeReport {
                options: ok_outcome(),
                register,
            },
        )
    }

    #[test]
    fn json_without_register_block() {
        let json: serde_json::Value = serde_json::from_str(&report(None).to_json().unwrap()).unwrap();
        assert_eq!(json["app"], "sip-qa");
        assert_eq!(json["target"]["host"], "sip.example.com");
        assert_eq!(json["target"]["port"], 5060);
        assert_eq!(json["options"]["ok"], true);
        assert_eq!(json["options"]["rtt_ms"], 31);
        assert!(json.get("register").is_none());
    }

    #[test]
    fn json_with_failed_register_block() {
        let failed = ProbeOutcome::failed(ProbeFailure::TransportTimeout);
        let text = report(Some(failed)).to_json().unwrap();
        assert!(text.ends_with("}\n"));

        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["register"]["ok"], false);
        assert_eq!(json["register"]["status"], 0);
        assert_eq!(json["register"]["rtt_ms"], -1);
        assert_eq!(json["register"]["peer_ip"], "");
        assert_eq!(json["register"]["peer_port"], 0);
        assert_eq!(json["register"]["note"], "no reply (timeout)");
    }

    #[test]
    fn summary_lines() {
        let failed = ProbeOutcome::failed(ProbeFailure::TransportTimeout);
        let text = report(Some(failed)).summary(&PathBuf::from("/tmp/r.json"));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "SIP QA report: /tmp/r.json");
        assert_eq!(
            lines[1],
            "OPTIONS: OK status=200 rtt_ms=31 peer=192.0.2.10:5060 (OK)"
        );
        assert_eq!(
            lines[2],
            "REGISTER: FAIL status=0 rtt_ms=-1 peer=:0 (no reply (timeout))"
        );
    }

    #[test]
    fn writes_report_file() {
        let path = std::env::temp_dir().join(format!("sip-qa-report-{}.json", std::process::id()));
        report(None).write_to(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"options\""));
        fs::remove_file(&path).unwrap();
    }
}
