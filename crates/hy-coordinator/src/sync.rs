//! Mirroring the source tree to remote agents with rsync

use std::path::Path;
use std::process::Stdio;

use futures::future::join_all;
use hy_core::config::{AgentSpec, SyncSpec};
use hy_core::SyncError;
use tokio::process::Command;

/// Build the rsync invocation mirroring `sync` to `agent`
pub fn rsync_command(sync: &SyncSpec, agent: &AgentSpec) -> Result<Command, SyncError> {
    let connect = agent
        .connect
        .as_deref()
        .ok_or_else(|| SyncError::Incomplete(format!("{}: no connect target", agent.label())))?;
    let directory = agent
        .directory
        .as_deref()
        .ok_or_else(|| SyncError::Incomplete(format!("{}: no remote directory", agent.label())))?;

    let mut cmd = Command::new("rsync");
    cmd.arg("-avz").arg("--delete");
    for pattern in &sync.exclude {
        cmd.arg(format!("--exclude={}", pattern));
    }
    cmd.arg(source_arg(&sync.directory));
    cmd.arg("-e").arg(ssh_arg(agent));
    cmd.arg(format!("{}:{}", connect, directory.display()));
    Ok(cmd)
}

/// Local directory with a trailing slash, so its contents are copied
fn source_arg(directory: &Path) -> String {
    let source = directory.display().to_string();
    if source.ends_with('/') {
        source
    } else {
        format!("{}/", source)
    }
}

/// The remote shell rsync runs, carrying the agent's ssh options
fn ssh_arg(agent: &AgentSpec) -> String {
    match agent.ssh_opts.as_deref().map(str::trim) {
        Some(opts) if !opts.is_empty() => format!("ssh {}", opts),
        _ => "ssh".to_string(),
    }
}

/// Mirror the source tree to one remote agent
pub async fn sync_agent(sync: &SyncSpec, agent: &AgentSpec) -> Result<(), SyncError> {
    let target = agent.label();
    let mut cmd = rsync_command(sync, agent)?;
    tracing::info!("Syncing {} to {}", sync.directory.display(), target);

    let output = cmd
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| SyncError::Spawn {
            target: target.clone(),
            source,
        })?;

    if output.status.success() {
        tracing::debug!("Synced {}", target);
        return Ok(());
    }

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Err(SyncError::Failed {
        target,
        status: output.status.to_string(),
        output: text.trim().to_string(),
    })
}

/// Mirror the source tree to every remote agent concurrently.
///
/// Local agents are skipped. Returns each remote agent's label and result.
pub async fn sync_many(
    sync: &SyncSpec,
    agents: &[AgentSpec],
) -> Vec<(String, Result<(), SyncError>)> {
    let remotes: Vec<&AgentSpec> = agents.iter().filter(|a| a.is_remote()).collect();
    let results = join_all(remotes.iter().map(|agent| sync_agent(sync, agent))).await;
    remotes
        .into_iter()
        .map(|agent| agent.label())
        .zip(results)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_rsync_arguments() {
        let sync = SyncSpec {
            directory: "/home/dev/app".into(),
            exclude: vec!["tmp".to_string(), "log".to_string()],
        };
        let mut agent = AgentSpec::ssh("ci@build-2", "/srv/app", 4);
        agent.ssh_opts = Some("-p 2222".to_string());

        let cmd = rsync_command(&sync, &agent).unwrap();
        assert_eq!(cmd.as_std().get_program(), "rsync");
        assert_eq!(
            args(&cmd),
            vec![
                "-avz",
                "--delete",
                "--exclude=tmp",
                "--exclude=log",
                "/home/dev/app/",
                "-e",
                "ssh -p 2222",
                "ci@build-2:/srv/app",
            ]
        );
    }

    #[test]
    fn test_plain_ssh_without_options() {
        let sync = SyncSpec {
            directory: "app/".into(),
            exclude: vec![],
        };
        let agent = AgentSpec::ssh("build-3", "/srv/app", 1);
        let cmd = rsync_command(&sync, &agent).unwrap();
        assert_eq!(args(&cmd), vec!["-avz", "--delete", "app/", "-e", "ssh", "build-3:/srv/app"]);
    }

    #[test]
    fn test_incomplete_agent() {
        let sync = SyncSpec::default();
        assert!(matches!(
            rsync_command(&sync, &AgentSpec::local(1)),
            Err(SyncError::Incomplete(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_many_skips_local_agents() {
        let sync = SyncSpec::default();
        let results = sync_many(&sync, &[AgentSpec::local(2)]).await;
        assert!(results.is_empty());
    }
}
