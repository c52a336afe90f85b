//! Sync command implementation

use anyhow::{bail, Result};
use hy_coordinator::sync::sync_many;
use hy_core::config::RunConfig;

use crate::output::{print_error, print_success, print_warning};

/// Mirror the configured source tree to every ssh agent.
///
/// Returns whether every agent synced.
pub async fn sync_command(config: &RunConfig) -> Result<bool> {
    let Some(sync) = config.sync.as_ref() else {
        bail!("No [sync] section in the configuration");
    };

    let results = sync_many(sync, &config.agents).await;
    if results.is_empty() {
        print_warning("No ssh agents configured, nothing to sync");
        return Ok(true);
    }

    let mut ok = true;
    for (target, result) in results {
        match result {
            Ok(()) => print_success(&format!("Synced {}", target)),
            Err(e) => {
                ok = false;
                print_error(&e.to_string());
            }
        }
    }
    Ok(ok)
}
