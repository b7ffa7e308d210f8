//! Cluster model: nodes, the master, and derived address lists
//!
//! Nodes are owned by whatever provisioned the cluster; the configurator only
//! holds cheap clones that share the node's remote channel.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use shared::{ClusterInventory, HostSpec};

use crate::traits::RemoteChannel;

/// A provisioned machine and the channel used to reach it
#[derive(Clone)]
pub struct Node {
    alias: String,
    private_address: IpAddr,
    channel: Arc<dyn RemoteChannel>,
}

impl Node {
    pub fn new(alias: impl Into<String>, private_address: IpAddr, channel: Arc<dyn RemoteChannel>) -> Self {
        Self {
            alias: alias.into(),
            private_address,
            channel,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn private_address(&self) -> IpAddr {
        self.private_address
    }

    pub fn channel(&self) -> &Arc<dyn RemoteChannel> {
        &self.channel
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("alias", &self.alias)
            .field("private_address", &self.private_address)
            .finish_non_exhaustive()
    }
}

/// The distinguished coordinator node
#[derive(Clone, Debug)]
pub struct Master {
    node: Node,
    public_name: String,
    network_groups: Vec<String>,
}

impl Master {
    pub fn new(node: Node, public_name: impl Into<String>, network_groups: Vec<String>) -> Self {
        Self {
            node,
            public_name: public_name.into(),
            network_groups,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn alias(&self) -> &str {
        self.node.alias()
    }

    pub fn private_address(&self) -> IpAddr {
        self.node.private_address()
    }

    pub fn channel(&self) -> &Arc<dyn RemoteChannel> {
        self.node.channel()
    }

    pub fn public_name(&self) -> &str {
        &self.public_name
    }

    pub fn network_groups(&self) -> &[String] {
        &self.network_groups
    }
}

/// Addresses of every node except the master, in node-list order
///
/// The master is matched by address, so it is excluded even when it also
/// appears in `nodes` under a different alias.
pub fn worker_addresses(master: &Master, nodes: &[Node]) -> Vec<IpAddr> {
    let master_address = master.private_address();
    nodes
        .iter()
        .map(Node::private_address)
        .filter(|address| *address != master_address)
        .collect()
}

/// Build the master and node list of an inventory
///
/// `connect` is called once per distinct alias to open that host's channel; a
/// master that also appears in the node list shares the node's channel.
pub fn from_inventory<F>(inventory: &ClusterInventory, mut connect: F) -> (Master, Vec<Node>)
where
    F: FnMut(&HostSpec) -> Arc<dyn RemoteChannel>,
{
    let nodes: Vec<Node> = inventory
        .nodes
        .iter()
        .map(|host| Node::new(host.alias.clone(), host.private_address, connect(host)))
        .collect();

    let master_spec = &inventory.master;
    let master_node = nodes
        .iter()
        .find(|node| node.alias() == master_spec.alias)
        .cloned()
        .unwrap_or_else(|| Node::new(master_spec.alias.clone(), master_spec.private_address, connect(master_spec)));

    let master = Master::new(
        master_node,
        master_spec.public_name.clone().unwrap_or_default(),
        master_spec.network_groups.clone(),
    );

    (master, nodes)
}
