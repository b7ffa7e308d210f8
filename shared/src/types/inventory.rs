//! Cluster inventory: the machines a configuration run targets
//!
//! The inventory is produced by whatever provisioned the machines and is read
//! from a JSON document of the form
//!
//! ```json
//! {
//!   "master": { "alias": "master", "private_address": "10.0.0.1",
//!               "public_name": "ec2-1-2-3-4.compute.amazonaws.com",
//!               "network_groups": ["INPUT"] },
//!   "nodes": [
//!     { "alias": "master",  "private_address": "10.0.0.1" },
//!     { "alias": "node001", "private_address": "10.0.0.2" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;

use crate::errors::{SharedError, SharedResult};

/// One provisioned machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub alias: String,
    pub private_address: IpAddr,

    /// Host to open the SSH session against; defaults to the private address
    #[serde(default)]
    pub ssh_host: Option<String>,

    /// Externally resolvable DNS name (required for the master)
    #[serde(default)]
    pub public_name: Option<String>,

    /// Network groups the host belongs to (security groups / firewall chains)
    #[serde(default)]
    pub network_groups: Vec<String>,
}

impl HostSpec {
    pub fn new(alias: impl Into<String>, private_address: IpAddr) -> Self {
        Self {
            alias: alias.into(),
            private_address,
            ssh_host: None,
            public_name: None,
            network_groups: Vec::new(),
        }
    }

    /// Address used to reach the host over SSH
    pub fn connect_host(&self) -> String {
        self.ssh_host
            .clone()
            .unwrap_or_else(|| self.private_address.to_string())
    }
}

/// Master plus the full node list of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInventory {
    pub master: HostSpec,
    pub nodes: Vec<HostSpec>,
}

impl ClusterInventory {
    /// Parse and validate an inventory from a JSON string
    pub fn from_json(json: &str) -> SharedResult<Self> {
        let inventory: ClusterInventory =
            serde_json::from_str(json).map_err(|e| SharedError::DeserializationError {
                message: e.to_string(),
            })?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Read, parse and validate an inventory file
    pub fn from_file(path: impl AsRef<Path>) -> SharedResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SharedError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> SharedResult<()> {
        if self.nodes.is_empty() {
            return Err(SharedError::inventory("node list is empty"));
        }

        match self.master.public_name.as_deref() {
            Some(name) if !name.trim().is_empty() => {}
            _ => {
                return Err(SharedError::inventory(format!(
                    "master '{}' has no public_name",
                    self.master.alias
                )))
            }
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.alias.trim().is_empty() {
                return Err(SharedError::inventory("node with empty alias"));
            }
            if !seen.insert(node.alias.as_str()) {
                return Err(SharedError::inventory(format!(
                    "duplicate node alias '{}'",
                    node.alias
                )));
            }
            if node.alias == self.master.alias && node.private_address != self.master.private_address {
                return Err(SharedError::inventory(format!(
                    "master '{}' is listed with address {} but the node entry has {}",
                    self.master.alias, self.master.private_address, node.private_address
                )));
            }
        }

        Ok(())
    }
}
