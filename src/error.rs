use std::fmt;

use thiserror::Error;

/// The fallback step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackStep {
    AddressAdd,
    LinkUp,
}

impl fmt::Display for FallbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackStep::AddressAdd => write!(f, "address add"),
            FallbackStep::LinkUp => write!(f, "link up"),
        }
    }
}

/// Errors raised while configuring or running a bring-up.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Invalid settings, detected before any interface is touched.
    #[error("configuration error: {0}")]
    Config(String),

    /// Address query failed for a single poll tick.
    #[error("unable to query addresses on {interface}: {cause}")]
    Query { interface: String, cause: String },

    /// Assigning the fallback address or raising the link failed.
    #[error("fallback {step} failed on {interface}: {cause}")]
    Fallback {
        step: FallbackStep,
        interface: String,
        cause: String,
    },
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::config("timeout must be at least 1 second, got 0").to_string(),
            "configuration error: timeout must be at least 1 second, got 0"
        );
        assert_eq!(
            Error::Fallback {
                step: FallbackStep::LinkUp,
                interface: "eth0".into(),
                cause: "operation not permitted".into(),
            }
            .to_string(),
            "fallback link up failed on eth0: operation not permitted"
        );
        assert_eq!(
            Error::Query {
                interface: "eth0".into(),
                cause: "no such device".into(),
            }
            .to_string(),
            "unable to query addresses on eth0: no such device"
        );
    }

    #[test]
    fn test_error_is_config() {
        assert!(Error::config("bad").is_config());
        assert!(
            !Error::Query {
                interface: "eth0".into(),
                cause: "x".into()
            }
            .is_config()
        );
    }
}
