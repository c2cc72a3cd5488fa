//! Sync CLI command for pushing local changes to the server.

use clap::Args;
use morel_core::{Manager, Sample, SyncReport};

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Sync only this sample (cid or server id)
    identifier: Option<String>,
}

impl SyncCommand {
    pub async fn run(&self, manager: &Manager) -> Result<(), Box<dyn std::error::Error>> {
        match &self.identifier {
            Some(identifier) => self.sync_one(manager, identifier).await,
            None => self.sync_all(manager).await,
        }
    }

    async fn sync_one(
        &self,
        manager: &Manager,
        identifier: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let sample = manager
            .find::<Sample>(identifier)
            .await?
            .ok_or_else(|| format!("Sample not found: {}", identifier))?;

        println!("Syncing with {}...", manager.options().url);
        let synced = manager.sync(&sample).await?;

        match synced.id {
            Some(id) => println!("✓ {} synced as {}", synced.cid, id),
            None => println!("✓ {} synced", synced.cid),
        }
        Ok(())
    }

    async fn sync_all(&self, manager: &Manager) -> Result<(), Box<dyn std::error::Error>> {
        println!("Syncing with {}...", manager.options().url);
        println!();

        let report = manager.sync_all().await?;
        print_report(&report);

        match report.aborted {
            Some(e) => Err(format!("Sync aborted: {}", e).into()),
            None => Ok(()),
        }
    }
}

fn print_report(report: &SyncReport) {
    if report.attempted == 0 {
        println!("Already up to date.");
        return;
    }

    println!("  ✓ {} synced", report.synced);
    if report.deleted > 0 {
        println!("  ✓ {} deleted", report.deleted);
    }
    for failure in &report.failures {
        println!(
            "  ✗ {} {}: {}",
            failure.collection, failure.key, failure.error
        );
    }

    println!();
    if report.is_complete() {
        println!("Sync complete.");
    } else {
        println!("Sync finished with {} failure(s).", report.failed());
    }
}
