use chrono::Utc;
use log::{Level, debug, warn};

use crate::config::Config;
use crate::error::Error;
use crate::logger::{init_logger, set_log_level};
use crate::network::{InterfaceControl, Unavailable};
use crate::status::StatusRecord;
use crate::supervisor::{Outcome, Supervisor};

pub const EXIT_FALLBACK_FAILED: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Load configuration, wait for the uplink, and record how it came up.
pub fn run() -> Result<Outcome, Error> {
    if let Err(e) = init_logger(Level::Info) {
        // Use eprintln! here since the logger did not initialize.
        eprintln!("unable to initialize logger: {}", e);
    }
    let config = Config::load()?;
    set_log_level(config.log_level);
    debug!("Configuration: {:?}", config);

    let control: Box<dyn InterfaceControl> = match config.backend.connect() {
        Ok(c) => c,
        Err(e) => {
            warn!("Unable to open {:?} backend: {:#}", config.backend, e);
            Box::new(Unavailable::new(config.backend, e))
        }
    };
    run_with(&config, control)
}

pub fn run_with<C: InterfaceControl>(config: &Config, control: C) -> Result<Outcome, Error> {
    let mut supervisor = Supervisor::new(control);
    let outcome = supervisor.bring_up(&config.policy)?;
    Ok(record(config, outcome))
}

fn record(config: &Config, outcome: Outcome) -> Outcome {
    if let Some(path) = &config.status_file {
        let status = StatusRecord::from_outcome(&config.policy.interface, &outcome, Utc::now());
        if let Err(e) = status.write(path) {
            warn!("Unable to write status file {:?}: {:#}", path, e);
        }
    }
    outcome
}

/// Process exit status for a finished run.
pub fn exit_code(result: &Result<Outcome, Error>) -> u8 {
    match result {
        Ok(outcome) if outcome.is_success() => 0,
        Ok(_) => EXIT_FALLBACK_FAILED,
        Err(e) if e.is_config() => EXIT_CONFIG_ERROR,
        Err(_) => EXIT_FALLBACK_FAILED,
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::FallbackStep;
    use crate::network::Backend;
    use crate::status::StatusRecord;
    use crate::supervisor::{BringUpPolicy, OutcomeKind};
    use crate::supervisor::test::ScriptedControl;

    fn config(timeout: i64, status_file: Option<PathBuf>) -> Config {
        Config {
            policy: BringUpPolicy::new("eth0", timeout, "192.168.10.1/24".parse().unwrap()),
            backend: Backend::Netlink,
            status_file,
            log_level: Level::Info,
        }
    }

    #[test]
    fn test_exit_code() {
        struct Case {
            result: Result<Outcome, Error>,
            expected: u8,
        }
        let cases = [
            Case {
                result: Ok(Outcome::LeaseAcquired {
                    tick: 1,
                    addresses: vec!["10.0.0.2/24".parse().unwrap()],
                }),
                expected: 0,
            },
            Case {
                result: Ok(Outcome::FallbackApplied {
                    cidr: "192.168.10.1/24".parse().unwrap(),
                }),
                expected: 0,
            },
            Case {
                result: Ok(Outcome::FallbackFailed(Error::Fallback {
                    step: FallbackStep::LinkUp,
                    interface: "eth0".into(),
                    cause: "denied".into(),
                })),
                expected: EXIT_FALLBACK_FAILED,
            },
            Case {
                result: Err(Error::config("timeout must be at least 1 second, got 0")),
                expected: EXIT_CONFIG_ERROR,
            },
        ];
        for case in cases {
            assert_eq!(case.expected, exit_code(&case.result));
        }
    }

    #[test]
    fn test_run_with_writes_status() {
        let dir =
            std::env::temp_dir().join(format!("link-fallback-app-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("status.json");

        let result = run_with(&config(1, Some(path.clone())), ScriptedControl::default());
        assert_eq!(exit_code(&result), 0);

        let record: StatusRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(record.interface, "eth0");
        assert_eq!(record.outcome, OutcomeKind::FallbackApplied);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_run_with_config_error_writes_nothing() {
        let dir =
            std::env::temp_dir().join(format!("link-fallback-app-cfg-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("status.json");

        let result = run_with(&config(0, Some(path.clone())), ScriptedControl::default());
        assert_eq!(exit_code(&result), EXIT_CONFIG_ERROR);
        assert!(!path.exists());
    }
}
