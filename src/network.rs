use std::net::IpAddr;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use log::debug;
use netlink_packet_route::AddressFamily;
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use rtnetlink::{Error as NlError, Handle as NlHandle, LinkUnspec, new_connection};
use rustix::io::Errno;
use tokio::runtime::{Builder, Runtime};

use crate::cidr::Ipv4Cidr;
use crate::constants::ENV_PATH;
use crate::error::Error;
use crate::iproute::IpCommandControl;

/// Reads and mutates the address state of named interfaces.
///
/// Both mutating operations must be safe to repeat: adding an address that
/// is already present, or raising a link that is already up, succeeds.
pub trait InterfaceControl {
    /// IPv4 addresses currently assigned to `interface`.
    fn addresses(&mut self, interface: &str) -> Result<Vec<Ipv4Cidr>>;

    fn address_add(&mut self, interface: &str, cidr: Ipv4Cidr) -> Result<()>;

    /// Set the administrative state of `interface` to up.
    fn link_up(&mut self, interface: &str) -> Result<()>;
}

impl<T: InterfaceControl + ?Sized> InterfaceControl for Box<T> {
    fn addresses(&mut self, interface: &str) -> Result<Vec<Ipv4Cidr>> {
        (**self).addresses(interface)
    }

    fn address_add(&mut self, interface: &str, cidr: Ipv4Cidr) -> Result<()> {
        (**self).address_add(interface, cidr)
    }

    fn link_up(&mut self, interface: &str) -> Result<()> {
        (**self).link_up(interface)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Netlink,
    IpCommand,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "netlink" | "rtnetlink" => Ok(Backend::Netlink),
            "ip" | "iproute2" => Ok(Backend::IpCommand),
            other => Err(Error::config(format!(
                "unknown link backend {:?}, expected netlink or ip",
                other
            ))),
        }
    }
}

impl Backend {
    pub fn connect(self) -> Result<Box<dyn InterfaceControl>> {
        Ok(match self {
            Backend::Netlink => Box::new(NetlinkControl::new()?),
            Backend::IpCommand => Box::new(IpCommandControl::new(ENV_PATH)?),
        })
    }
}

/// Stands in for a backend that could not be opened. Every call fails with
/// the original cause, so polls miss and the fallback is reported as failed.
pub struct Unavailable {
    cause: String,
}

impl Unavailable {
    pub fn new(backend: Backend, e: anyhow::Error) -> Self {
        Self {
            cause: format!("{:?} backend unavailable: {:#}", backend, e),
        }
    }
}

impl InterfaceControl for Unavailable {
    fn addresses(&mut self, _interface: &str) -> Result<Vec<Ipv4Cidr>> {
        Err(anyhow!("{}", self.cause))
    }

    fn address_add(&mut self, _interface: &str, _cidr: Ipv4Cidr) -> Result<()> {
        Err(anyhow!("{}", self.cause))
    }

    fn link_up(&mut self, _interface: &str) -> Result<()> {
        Err(anyhow!("{}", self.cause))
    }
}

/// rtnetlink backend. The connection is driven by a private current-thread
/// runtime, which only runs while one of the methods is blocking on it.
pub struct NetlinkControl {
    rt: Runtime,
    handle: NlHandle,
}

impl NetlinkControl {
    pub fn new() -> Result<Self> {
        let rt = Builder::new_current_thread()
            .enable_io()
            .build()
            .context("unable to start netlink runtime")?;
        let handle = rt.block_on(async {
            let (connection, handle, _) = new_connection()
                .map_err(|e| anyhow!("unable to create netlink socket: {}", e))?;
            tokio::spawn(connection);
            Ok::<_, anyhow::Error>(handle)
        })?;
        Ok(Self { rt, handle })
    }
}

impl InterfaceControl for NetlinkControl {
    fn addresses(&mut self, interface: &str) -> Result<Vec<Ipv4Cidr>> {
        let handle = &self.handle;
        self.rt.block_on(async {
            let ifindex = link_index(handle, interface).await?;
            let mut stream = handle
                .address()
                .get()
                .set_link_index_filter(ifindex)
                .execute();
            let mut found = Vec::new();
            while let Some(msg_res) = stream.next().await {
                let msg = msg_res.context("failed to dump addresses")?;
                if msg.header.index != ifindex {
                    continue;
                }
                if let Some(cidr) = ipv4_from_message(&msg) {
                    found.push(cidr);
                }
            }
            Ok(found)
        })
    }

    fn address_add(&mut self, interface: &str, cidr: Ipv4Cidr) -> Result<()> {
        let handle = &self.handle;
        self.rt.block_on(async {
            let ifindex = link_index(handle, interface).await?;
            let res = handle
                .address()
                .add(ifindex, IpAddr::V4(cidr.address), cidr.prefix_len)
                .execute()
                .await;
            match res {
                Ok(()) => Ok(()),
                Err(e) if is_already_exists(&e) => {
                    debug!("Address {} already present on {}", cidr, interface);
                    Ok(())
                }
                Err(e) => Err(e).context(format!("unable to add {} to {}", cidr, interface)),
            }
        })
    }

    fn link_up(&mut self, interface: &str) -> Result<()> {
        let handle = &self.handle;
        self.rt.block_on(async {
            let ifindex = link_index(handle, interface).await?;
            handle
                .link()
                .set(LinkUnspec::new_with_index(ifindex).up().build())
                .execute()
                .await
                .context(format!("failed to set link {} up", interface))
        })
    }
}

async fn link_index(handle: &NlHandle, interface: &str) -> Result<u32> {
    let mut links = handle.link().get().match_name(interface.to_string()).execute();
    match links.next().await {
        Some(Ok(link)) => Ok(link.header.index),
        Some(Err(e)) => Err(e).context(format!("unable to look up interface {}", interface)),
        None => Err(anyhow!("interface {} not found", interface)),
    }
}

fn is_already_exists(e: &NlError) -> bool {
    match e {
        NlError::NetlinkError(msg) => msg.raw_code() == -Errno::EXIST.raw_os_error(),
        _ => false,
    }
}

// For IPv4 the local attribute carries the interface's own address; the
// address attribute is the peer on point-to-point links.
fn ipv4_from_message(msg: &AddressMessage) -> Option<Ipv4Cidr> {
    if msg.header.family != AddressFamily::Inet {
        return None;
    }
    let mut local = None;
    let mut address = None;
    for attr in &msg.attributes {
        match attr {
            AddressAttribute::Local(IpAddr::V4(v4)) => local = Some(*v4),
            AddressAttribute::Address(IpAddr::V4(v4)) => address = Some(*v4),
            _ => {}
        }
    }
    local.or(address).map(|a| Ipv4Cidr {
        address: a,
        prefix_len: msg.header.prefix_len,
    })
}
