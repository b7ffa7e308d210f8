//! Per-node jobs run inside the worker pool
//!
//! Every job takes owned arguments so it can be spawned onto the pool and
//! touches exactly one node.

use std::net::IpAddr;
use std::sync::Arc;

use shared::node_debug;

use crate::cluster::Node;
use crate::core::templates::{Template, TemplateContext};
use crate::error::BootstrapResult;

/// Contents of the masters file
pub fn masters_file_contents(master_address: IpAddr) -> String {
    master_address.to_string()
}

/// Contents of the workers file: one address per line, no trailing newline
pub fn workers_file_contents(workers: &[IpAddr]) -> String {
    workers
        .iter()
        .map(IpAddr::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render `template` with the shared context and write it to `path`
pub async fn write_template(
    node: Node,
    template: Template,
    path: String,
    context: Arc<TemplateContext>,
) -> BootstrapResult<()> {
    let contents = template.render(&context)?;
    node.channel().write_file(&path, &contents).await?;
    node_debug!(node.alias(), "📝 Wrote {} to {}", template.name, path);
    Ok(())
}

/// Write the single-entry masters file
pub async fn write_masters(node: Node, path: String, master_address: IpAddr) -> BootstrapResult<()> {
    node.channel()
        .write_file(&path, &masters_file_contents(master_address))
        .await?;
    node_debug!(node.alias(), "📝 Wrote masters file {}", path);
    Ok(())
}

/// Write the precomputed workers list
pub async fn write_workers(node: Node, path: String, workers: Arc<Vec<IpAddr>>) -> BootstrapResult<()> {
    node.channel()
        .write_file(&path, &workers_file_contents(&workers))
        .await?;
    node_debug!(node.alias(), "📝 Wrote {} worker(s) to {}", workers.len(), path);
    Ok(())
}

/// Run the post-install commands in order, stopping at the first failure
pub async fn run_commands(node: Node, commands: Arc<Vec<String>>) -> BootstrapResult<()> {
    for command in commands.iter() {
        node.channel().execute(command).await?;
        node_debug!(node.alias(), "⚙️ {}", command);
    }
    Ok(())
}
