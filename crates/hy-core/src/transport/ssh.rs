//! Remote links over the system `ssh` client
//!
//! The remote side is a login shell on a pseudo-terminal (`ssh -tt`), so
//! output is flushed line by line. The link changes into the working
//! directory, starts the remote command, and writes `exit` when closed.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

use super::Transport;
use crate::error::TransportError;

/// Command written to the remote shell when the link is closed
pub const CLOSE_COMMAND: &str = "exit";

/// Quote a string for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Build the `ssh` invocation for `connect`
pub fn ssh_command(connect: &str, ssh_args: &[String]) -> Command {
    let mut cmd = Command::new("ssh");
    cmd.arg("-tt").args(ssh_args).arg(connect);
    cmd
}

/// Open a remote link and start `command` in `directory` on the far side.
///
/// Returns the transport together with the `ssh` child, which the caller
/// reaps on teardown.
pub async fn connect(
    connect: &str,
    ssh_args: &[String],
    directory: &Path,
    command: &str,
) -> Result<(Transport, Child), TransportError> {
    tracing::debug!("Opening ssh link to {} in {}", connect, directory.display());

    let mut child = ssh_command(connect, ssh_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    let transport = Transport::from_child(&mut child)?.with_close_command(CLOSE_COMMAND);
    let sender = transport.sender();
    sender
        .write_line(&format!("cd {}", shell_quote(&directory.to_string_lossy())))
        .await?;
    sender.write_line(command).await?;

    Ok((transport, child))
}
