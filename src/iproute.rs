use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Result, anyhow};
use log::debug;
use rustix::fs::stat;

use crate::cidr::Ipv4Cidr;
use crate::network::InterfaceControl;

const IP_EXECUTABLE: &str = "ip";

pub fn find_executable_in_path(executable: &str, path_var: &str) -> Option<PathBuf> {
    for dir in path_var.split(':').filter(|d| !d.is_empty()) {
        let try_path = Path::new(dir).join(executable);
        if let Ok(st) = stat(&try_path)
            && st.st_mode & 0o111 != 0
        {
            return Some(try_path);
        }
    }
    None
}

/// Backend that drives the iproute2 `ip` tool.
#[derive(Debug)]
pub struct IpCommandControl {
    ip_path: PathBuf,
}

impl IpCommandControl {
    pub fn new(path_var: &str) -> Result<Self> {
        let ip_path = find_executable_in_path(IP_EXECUTABLE, path_var)
            .ok_or_else(|| anyhow!("unable to find {} in {}", IP_EXECUTABLE, path_var))?;
        debug!("Using {:?} for interface control", ip_path);
        Ok(Self { ip_path })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!("Running {:?} {}", self.ip_path, args.join(" "));
        Command::new(&self.ip_path)
            .args(args)
            .output()
            .map_err(|e| anyhow!("unable to run {:?}: {}", self.ip_path, e))
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(output);
        }
        Err(command_error(args, &output))
    }
}

impl InterfaceControl for IpCommandControl {
    fn addresses(&mut self, interface: &str) -> Result<Vec<Ipv4Cidr>> {
        let output = self.run_checked(&["-4", "-o", "addr", "show", "dev", interface])?;
        Ok(parse_addr_show(&String::from_utf8_lossy(&output.stdout)))
    }

    fn address_add(&mut self, interface: &str, cidr: Ipv4Cidr) -> Result<()> {
        let cidr_str = cidr.to_string();
        let args = ["addr", "add", cidr_str.as_str(), "dev", interface];
        let output = self.run(&args)?;
        if output.status.success() {
            return Ok(());
        }
        // "RTNETLINK answers: File exists" means the address is already there.
        if String::from_utf8_lossy(&output.stderr).contains("File exists") {
            debug!("Address {} already present on {}", cidr, interface);
            return Ok(());
        }
        Err(command_error(&args, &output))
    }

    fn link_up(&mut self, interface: &str) -> Result<()> {
        self.run_checked(&["link", "set", interface, "up"])
            .map(|_| ())
    }
}

fn command_error(args: &[&str], output: &Output) -> anyhow::Error {
    let stderr = String::from_utf8_lossy(&output.stderr);
    match output.status.code() {
        Some(code) => anyhow!(
            "ip {} failed with exit code {}: {}",
            args.join(" "),
            code,
            stderr.trim()
        ),
        None => anyhow!("ip {} terminated by signal", args.join(" ")),
    }
}

// Parse `ip -4 -o addr show` output, one address per line, e.g.
// "2: eth0    inet 192.168.1.5/24 brd 192.168.1.255 scope global eth0\ ..."
fn parse_addr_show(stdout: &str) -> Vec<Ipv4Cidr> {
    let mut found = Vec::new();
    for line in stdout.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.by_ref().find(|t| *t == "inet").is_none() {
            continue;
        }
        let Some(token) = tokens.next() else {
            continue;
        };
        // Point-to-point addresses are printed without a prefix.
        let parsed = if token.contains('/') {
            token.parse::<Ipv4Cidr>().ok()
        } else {
            token
                .parse()
                .ok()
                .map(|address| Ipv4Cidr {
                    address,
                    prefix_len: 32,
                })
        };
        match parsed {
            Some(cidr) => found.push(cidr),
            None => debug!("Ignoring unparseable address line: {}", line),
        }
    }
    found
}
