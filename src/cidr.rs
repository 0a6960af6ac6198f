use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::Error;

/// An IPv4 address with a prefix length, e.g. `192.168.10.1/24`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, Error> {
        if prefix_len > 32 {
            return Err(Error::config(format!(
                "prefix length {} is out of range 0-32",
                prefix_len
            )));
        }
        Ok(Self {
            address,
            prefix_len,
        })
    }

    /// Build from an address and a dotted subnet mask such as `255.255.255.0`.
    pub fn from_mask(address: Ipv4Addr, mask: Ipv4Addr) -> Result<Self, Error> {
        let prefix_len = subnet_mask_to_prefix(mask)
            .ok_or_else(|| Error::config(format!("subnet mask {} is not contiguous", mask)))?;
        Self::new(address, prefix_len)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::config(format!("{:?} is missing a /prefix", s)))?;
        let address = addr
            .parse::<Ipv4Addr>()
            .map_err(|e| Error::config(format!("invalid IPv4 address {:?}: {}", addr, e)))?;
        Self::new(address, parse_prefix(prefix)?)
    }
}

// A mask converts only if its set bits are contiguous from the top.
fn subnet_mask_to_prefix(mask: Ipv4Addr) -> Option<u8> {
    let m = u32::from_be_bytes(mask.octets());
    let ones = m.leading_ones();
    if m.checked_shl(ones).unwrap_or(0) != 0 {
        return None;
    }
    Some(ones as u8)
}

/// Parse a prefix length written as `24`, `/24` or a dotted mask.
pub fn parse_prefix(s: &str) -> Result<u8, Error> {
    let s = s.trim();
    if s.contains('.') {
        let mask = s
            .parse::<Ipv4Addr>()
            .map_err(|e| Error::config(format!("invalid subnet mask {:?}: {}", s, e)))?;
        return subnet_mask_to_prefix(mask)
            .ok_or_else(|| Error::config(format!("subnet mask {} is not contiguous", mask)));
    }
    let digits = s.strip_prefix('/').unwrap_or(s);
    match digits.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(p),
        _ => Err(Error::config(format!("invalid prefix length {:?}", s))),
    }
}
