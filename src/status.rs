use std::io::Write;
use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rustix::fs::Mode;
use serde::{Deserialize, Serialize};

use crate::fs::{atomic_write, mkdir_p};
use crate::supervisor::{Outcome, OutcomeKind};

/// What the administration panel reads to show how the uplink came up.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub interface: String,
    pub outcome: OutcomeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl StatusRecord {
    pub fn from_outcome(interface: &str, outcome: &Outcome, now: DateTime<Utc>) -> Self {
        let (addresses, error) = match outcome {
            Outcome::LeaseAcquired { addresses, .. } => {
                (addresses.iter().map(|a| a.to_string()).collect(), None)
            }
            Outcome::FallbackApplied { cidr } => (vec![cidr.to_string()], None),
            Outcome::FallbackFailed(e) => (Vec::new(), Some(e.to_string())),
        };
        StatusRecord {
            interface: interface.to_string(),
            outcome: outcome.kind(),
            addresses,
            error,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            mkdir_p(dir, Mode::from(0o755))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| anyhow!("unable to serialize status: {}", e))?;
        atomic_write(path, |mut f| {
            writeln!(f, "{}", json).map_err(|e| anyhow!("unable to write {:?}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::{Error, FallbackStep};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 6, 30, 0).unwrap()
    }

    #[test]
    fn test_status_from_lease() {
        let outcome = Outcome::LeaseAcquired {
            tick: 2,
            addresses: vec!["10.0.0.42/24".parse().unwrap()],
        };
        let record = StatusRecord::from_outcome("eth0", &outcome, now());
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"interface":"eth0","outcome":"lease-acquired","addresses":["10.0.0.42/24"],"timestamp":"2026-01-01T06:30:00Z"}"#
        );
    }

    #[test]
    fn test_status_from_fallback_failed() {
        let outcome = Outcome::FallbackFailed(Error::Fallback {
            step: FallbackStep::AddressAdd,
            interface: "eth0".into(),
            cause: "operation not permitted".into(),
        });
        let record = StatusRecord::from_outcome("eth0", &outcome, now());
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("addresses"));
        assert!(json.contains(
            r#""error":"fallback address add failed on eth0: operation not permitted""#
        ));

        let parsed: StatusRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_status_write() {
        let dir =
            std::env::temp_dir().join(format!("link-fallback-status-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("run/status.json");
        let outcome = Outcome::FallbackApplied {
            cidr: "192.168.10.1/24".parse().unwrap(),
        };
        let record = StatusRecord::from_outcome("eth0", &outcome, now());
        record.write(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: StatusRecord = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.outcome, OutcomeKind::FallbackApplied);
        assert_eq!(parsed.addresses, vec!["192.168.10.1/24".to_string()]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
