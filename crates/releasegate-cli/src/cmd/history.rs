use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use releasegate_core::audit::{AuditLog, HistoryQuery, RedbStore};
use releasegate_core::config::Config;
use std::path::Path;

#[derive(Subcommand)]
pub enum HistorySubcommand {
    /// List recorded deploys, newest first
    List {
        /// Maximum entries (default 50, at most 200)
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        app: Option<String>,
        #[arg(long)]
        env: Option<String>,
    },

    /// Delete every recorded deploy
    Clear,
}

pub fn run(path: &Path, subcmd: HistorySubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(path).with_context(|| format!("failed to load {}", path.display()))?;
    let db_path = config
        .audit
        .path
        .as_deref()
        .context("audit.path is not set; there is no history to read")?;
    let log = AuditLog::new(RedbStore::open(db_path).context("failed to open audit store")?);

    match subcmd {
        HistorySubcommand::List { limit, app, env } => {
            list(&log, HistoryQuery { limit, app, env }, json)
        }
        HistorySubcommand::Clear => clear(&log, json),
    }
}

fn list(log: &AuditLog, query: HistoryQuery, json: bool) -> anyhow::Result<()> {
    let events = log.list(&query)?;

    if json {
        return print_json(&serde_json::json!({ "events": events }));
    }
    if events.is_empty() {
        println!("No deploys recorded.");
        return Ok(());
    }

    let rows = events
        .iter()
        .map(|e| {
            vec![
                e.ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.app.clone(),
                e.env.clone(),
                e.commit_sha.chars().take(7).collect(),
                e.actor.clone().unwrap_or_else(|| "-".to_string()),
                e.result
                    .hook_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                e.commit_msg.clone(),
            ]
        })
        .collect();
    print_table(
        &["TIME", "APP", "ENV", "COMMIT", "ACTOR", "HOOK", "MESSAGE"],
        rows,
    );
    Ok(())
}

fn clear(log: &AuditLog, json: bool) -> anyhow::Result<()> {
    let removed = log.clear()?;
    if json {
        print_json(&serde_json::json!({ "ok": true, "removed": removed }))?;
    } else {
        println!("Cleared {removed} entries.");
    }
    Ok(())
}
