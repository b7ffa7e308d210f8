//! Firewall rule types used by the network-control collaborator

use serde::{Deserialize, Serialize};
use std::fmt;

/// IP protocol of an inbound rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound permission: protocol, inclusive port range and source CIDR
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRule {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr: String,
}

impl PortRule {
    pub fn new(protocol: Protocol, from_port: u16, to_port: u16, cidr: impl Into<String>) -> Self {
        Self {
            protocol,
            from_port,
            to_port,
            cidr: cidr.into(),
        }
    }

    /// Rule covering exactly one port
    pub fn single_port(protocol: Protocol, port: u16, cidr: impl Into<String>) -> Self {
        Self::new(protocol, port, port, cidr)
    }

    /// Port range in the `from:to` form accepted by iptables
    pub fn port_range(&self) -> String {
        if self.from_port == self.to_port {
            self.from_port.to_string()
        } else {
            format!("{}:{}", self.from_port, self.to_port)
        }
    }
}

impl fmt::Display for PortRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{} from {}",
            self.protocol, self.from_port, self.to_port, self.cidr
        )
    }
}
