//! Remote channel over the system `ssh` client
//!
//! Commands are passed to `ssh` as a single remote command string. File
//! writes stream the contents through the child's stdin into `cat` on the
//! node, so no temporary files are left behind on either side.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{BootstrapError, BootstrapResult};
use crate::traits::{CommandOutput, RemoteChannel};

/// Exit status `ssh` itself uses for connection and authentication errors
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Options passed to every `ssh` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    pub user: String,
    pub identity: Option<String>,
    pub port: u16,
    pub connect_timeout_secs: u64,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            identity: None,
            port: 22,
            connect_timeout_secs: 30,
        }
    }
}

impl SshOptions {
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_identity(mut self, identity: Option<String>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// How commands reach the node
#[derive(Debug, Clone, PartialEq, Eq)]
enum Transport {
    Ssh { host: String, options: SshOptions },
    /// Run through `sh -c` on this machine
    Local,
}

/// [RemoteChannel] backed by a child process per call
#[derive(Debug, Clone)]
pub struct SshChannel {
    node: String,
    transport: Transport,
}

impl SshChannel {
    /// Channel to `host` (address or DNS name) for the node called `node`
    pub fn new(node: impl Into<String>, host: impl Into<String>, options: SshOptions) -> Self {
        Self {
            node: node.into(),
            transport: Transport::Ssh {
                host: host.into(),
                options,
            },
        }
    }

    /// Channel that runs everything on the local machine
    pub fn local(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            transport: Transport::Local,
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Program and arguments that run `remote_cmd` on the node
    pub fn command_line(&self, remote_cmd: &str) -> (String, Vec<String>) {
        match &self.transport {
            Transport::Local => ("sh".to_string(), vec!["-c".to_string(), remote_cmd.to_string()]),
            Transport::Ssh { host, options } => {
                let mut args = vec![
                    "-o".to_string(),
                    "StrictHostKeyChecking=no".to_string(),
                    "-o".to_string(),
                    "BatchMode=yes".to_string(),
                    "-o".to_string(),
                    format!("ConnectTimeout={}", options.connect_timeout_secs),
                    "-p".to_string(),
                    options.port.to_string(),
                ];
                if let Some(identity) = &options.identity {
                    args.push("-i".to_string());
                    args.push(identity.clone());
                }
                args.push("-l".to_string());
                args.push(options.user.clone());
                args.push(host.clone());
                args.push(remote_cmd.to_string());
                ("ssh".to_string(), args)
            }
        }
    }

    async fn run(&self, remote_cmd: &str, stdin: Option<&str>) -> BootstrapResult<CommandOutput> {
        let (program, args) = self.command_line(remote_cmd);
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| BootstrapError::connection(&self.node, format!("failed to spawn {program}: {e}")))?;

        if let (Some(contents), Some(mut pipe)) = (stdin, child.stdin.take()) {
            match pipe.write_all(contents.as_bytes()).await {
                Ok(()) => {}
                // The remote side exited before reading; its status and stderr say why
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(BootstrapError::connection(
                        &self.node,
                        format!("failed to stream input: {e}"),
                    ));
                }
            }
            // Closing stdin ends the remote `cat`
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BootstrapError::connection(&self.node, e.to_string()))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    fn is_connection_failure(&self, output: &CommandOutput) -> bool {
        matches!(self.transport, Transport::Ssh { .. }) && output.exit_code == Some(SSH_CONNECTION_FAILURE)
    }
}

/// Quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn execute(&self, command: &str) -> BootstrapResult<CommandOutput> {
        let output = self.run(command, None).await?;
        if output.exit_code == Some(0) {
            return Ok(output);
        }
        if self.is_connection_failure(&output) {
            return Err(BootstrapError::connection(&self.node, output.stderr.trim()));
        }
        Err(BootstrapError::RemoteCommand {
            node: self.node.clone(),
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }

    async fn write_file(&self, path: &str, contents: &str) -> BootstrapResult<()> {
        let command = format!("cat > {}", shell_quote(path));
        let output = self.run(&command, Some(contents)).await?;
        if output.exit_code == Some(0) {
            return Ok(());
        }
        if self.is_connection_failure(&output) {
            return Err(BootstrapError::connection(&self.node, output.stderr.trim()));
        }
        Err(BootstrapError::FileWrite {
            node: self.node.clone(),
            path: path.to_string(),
            message: output.stderr.trim().to_string(),
        })
    }
}
