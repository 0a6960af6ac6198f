use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::cidr::Ipv4Cidr;
use crate::constants::MAX_INTERFACE_NAME_LEN;
use crate::error::{Error, FallbackStep};
use crate::network::InterfaceControl;

/// What to wait for and what to assign if it never shows up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BringUpPolicy {
    pub interface: String,
    /// Length of the polling window. Must be at least 1.
    pub timeout_seconds: i64,
    pub fallback_cidr: Ipv4Cidr,
    pub poll_interval: Duration,
}

impl BringUpPolicy {
    pub fn new<S: Into<String>>(
        interface: S,
        timeout_seconds: i64,
        fallback_cidr: Ipv4Cidr,
    ) -> Self {
        Self {
            interface: interface.into(),
            timeout_seconds,
            fallback_cidr,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Check the policy and return the number of poll ticks it allows.
    ///
    /// Ticks are spaced one interval apart starting at zero, so the time
    /// slept between the first and last tick never exceeds the timeout.
    pub fn validate(&self) -> Result<u32, Error> {
        if self.interface.is_empty() {
            return Err(Error::config("interface name is empty"));
        }
        if self.interface.len() > MAX_INTERFACE_NAME_LEN
            || self
                .interface
                .chars()
                .any(|c| c == '/' || c.is_whitespace())
        {
            return Err(Error::config(format!(
                "invalid interface name {:?}",
                self.interface
            )));
        }
        if self.timeout_seconds < 1 {
            return Err(Error::config(format!(
                "timeout must be at least 1 second, got {}",
                self.timeout_seconds
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be greater than zero"));
        }
        let timeout = Duration::from_secs(self.timeout_seconds.unsigned_abs());
        let ticks = timeout.as_nanos().div_ceil(self.poll_interval.as_nanos());
        let ticks = u32::try_from(ticks).map_err(|_| {
            Error::config(format!(
                "timeout {} is too large for a {:?} poll interval",
                self.timeout_seconds, self.poll_interval
            ))
        })?;
        let address = self.fallback_cidr.address;
        if address.is_unspecified() || address.is_multicast() || address.is_broadcast() {
            return Err(Error::config(format!(
                "fallback address {} is not a host address",
                address
            )));
        }
        if self.fallback_cidr.prefix_len > 32 {
            return Err(Error::config(format!(
                "fallback prefix length {} is out of range",
                self.fallback_cidr.prefix_len
            )));
        }
        Ok(ticks)
    }
}

/// Terminal result of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// An address showed up on poll `tick`.
    LeaseAcquired { tick: u32, addresses: Vec<Ipv4Cidr> },
    FallbackApplied { cidr: Ipv4Cidr },
    /// Holds an [`Error::Fallback`].
    FallbackFailed(Error),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::FallbackFailed(_))
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::LeaseAcquired { .. } => OutcomeKind::LeaseAcquired,
            Outcome::FallbackApplied { .. } => OutcomeKind::FallbackApplied,
            Outcome::FallbackFailed(_) => OutcomeKind::FallbackFailed,
        }
    }
}

/// The variant of an [`Outcome`] without its payload, as recorded in the
/// status file.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    LeaseAcquired,
    FallbackApplied,
    FallbackFailed,
}

/// Blocks between poll ticks.
pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub struct Supervisor<C, P = ThreadPause> {
    control: C,
    pause: P,
}

impl<C: InterfaceControl> Supervisor<C, ThreadPause> {
    pub fn new(control: C) -> Self {
        Self::with_pause(control, ThreadPause)
    }
}

impl<C: InterfaceControl, P: Pause> Supervisor<C, P> {
    pub fn with_pause(control: C, pause: P) -> Self {
        Self { control, pause }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Wait for `policy.interface` to get an address, assigning the
    /// fallback if none appears within the timeout.
    ///
    /// A configuration error is returned before the interface is queried.
    /// Every other path ends in an [`Outcome`].
    pub fn bring_up(&mut self, policy: &BringUpPolicy) -> Result<Outcome, Error> {
        let ticks = policy.validate()?;
        let interface = policy.interface.as_str();

        info!(
            "Waiting for address on {} ({}s, polling every {:?})",
            interface, policy.timeout_seconds, policy.poll_interval
        );
        for tick in 1..=ticks {
            match self.control.addresses(interface) {
                Ok(addresses) if !addresses.is_empty() => {
                    info!(
                        "Address on {} after {} poll(s): {}",
                        interface,
                        tick,
                        join_cidrs(&addresses)
                    );
                    return Ok(Outcome::LeaseAcquired { tick, addresses });
                }
                Ok(_) => debug!("No address on {} at poll {}/{}", interface, tick, ticks),
                Err(e) => {
                    let err = Error::Query {
                        interface: interface.to_string(),
                        cause: format!("{:#}", e),
                    };
                    warn!("{} (poll {}/{})", err, tick, ticks);
                }
            }
            if tick < ticks {
                self.pause.pause(policy.poll_interval);
            }
        }

        info!(
            "No address on {}, assigning fallback {}",
            interface, policy.fallback_cidr
        );
        Ok(self.apply_fallback(interface, policy.fallback_cidr))
    }

    // The link is only raised once the address is in place.
    fn apply_fallback(&mut self, interface: &str, cidr: Ipv4Cidr) -> Outcome {
        let failed = |step, e: anyhow::Error| {
            let err = Error::Fallback {
                step,
                interface: interface.to_string(),
                cause: format!("{:#}", e),
            };
            error!("{}", err);
            Outcome::FallbackFailed(err)
        };
        if let Err(e) = self.control.address_add(interface, cidr) {
            return failed(FallbackStep::AddressAdd, e);
        }
        if let Err(e) = self.control.link_up(interface) {
            return failed(FallbackStep::LinkUp, e);
        }
        info!("Fallback {} applied on {}", cidr, interface);
        Outcome::FallbackApplied { cidr }
    }
}

pub(crate) fn join_cidrs(cidrs: &[Ipv4Cidr]) -> String {
    cidrs
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
