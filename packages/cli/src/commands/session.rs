use super::input::{OutputFormat, ReplayFile};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use inkwell_ot::ConsistencyReport;
use inkwell_session::{DocumentUpdate, MemoryStore, SessionConfig, SessionManager};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::info;

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Replay file (JSON)
    pub input: PathBuf,

    /// Config file (defaults to inkwell.config.json in the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// What a live session produced for one document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub document_id: String,
    pub content: String,
    pub version: u64,
    pub clock: u64,
    /// Updates each author's client received
    pub updates: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyReport>,
}

pub fn session(args: SessionArgs, cwd: &Path) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::from_path(path)?,
        None => SessionConfig::load(cwd)?,
    };
    let file = ReplayFile::load(&args.input)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let reports = runtime.block_on(run_session(&file, config))?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => print_text(&reports),
    }

    Ok(())
}

/// Drive every document of `file` through its own actor, one client per author
pub async fn run_session(file: &ReplayFile, config: SessionConfig) -> Result<Vec<SessionReport>> {
    let manager = SessionManager::new(config, Arc::new(MemoryStore::new()));
    let mut reports = Vec::new();

    for document_id in file.document_ids() {
        let handle = manager.open_with_content(&document_id, file.base(&document_id))?;

        let authors: BTreeSet<&str> = file
            .operations_for(&document_id)
            .map(|op| op.author_id.as_str())
            .collect();
        let mut clients = Vec::new();
        for author in authors {
            let stream = handle.subscribe(author).await?;
            let received = tokio::spawn(stream.collect::<Vec<DocumentUpdate>>());
            clients.push((author.to_string(), received));
        }

        let expected = file.expected.get(&document_id);
        if let Some(expected) = expected {
            let version = file.operations_for(&document_id).count() as u64;
            handle.record_expected(expected.clone(), Some(version)).await?;
        }

        // Every operation in a replay file is written against the file's base
        for op in file.operations_for(&document_id) {
            let base = op.base_version.unwrap_or(0);
            handle.submit(op.clone().based_on(base)).await?;
        }
        handle.flush().await?;

        let consistency = match expected {
            Some(_) => {
                let snapshot = handle.snapshot().await?;
                Some(handle.consistency_report(snapshot.content).await?)
            }
            None => None,
        };

        // Closing drops the subscriptions, which ends every client stream
        let snapshot = manager.close(&document_id).await?;
        let mut updates = BTreeMap::new();
        for (author, received) in clients {
            updates.insert(author, received.await?.len());
        }

        info!(document_id = %document_id, version = snapshot.version, "Session finished");
        reports.push(SessionReport {
            document_id,
            content: snapshot.content,
            version: snapshot.version,
            clock: snapshot.clock,
            updates,
            consistency,
        });
    }

    Ok(reports)
}

fn print_text(reports: &[SessionReport]) {
    for report in reports {
        println!(
            "📡 {} {} {}",
            report.document_id.bold(),
            format!("v{}", report.version).dimmed(),
            format!("clock {}", report.clock).dimmed()
        );
        println!("   {:?}", report.content);
        for (author, count) in &report.updates {
            println!("   {} {} received {} update(s)", "→".cyan(), author, count);
        }
        match &report.consistency {
            Some(report) if report.is_consistent() => {
                println!("   {} Matches expected content", "✓".green())
            }
            Some(_) => println!("   {} Diverged from expected content", "✗".red()),
            None => {}
        }
        println!();
    }
}
