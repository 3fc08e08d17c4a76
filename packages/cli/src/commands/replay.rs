use super::input::{describe, OutputFormat, ReplayFile};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use inkwell_ot::{
    transform_cursor_through, ConsistencyReport, DocumentState, Operation, OperationQueues,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Replay file (JSON)
    pub input: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Outcome of folding one document's batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReplay {
    pub document_id: String,
    pub content: String,
    pub version: u64,
    /// Operations as applied, for rebroadcast
    pub operations: Vec<Operation>,
    pub cursors: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyReport>,
}

pub fn replay(args: ReplayArgs, _cwd: &Path) -> Result<()> {
    let file = ReplayFile::load(&args.input)?;
    let documents = replay_file(&file)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&documents)?),
        OutputFormat::Text => print_text(&file, &documents),
    }

    let diverged = documents
        .iter()
        .filter(|doc| matches!(&doc.consistency, Some(report) if !report.is_consistent()))
        .count();
    if diverged > 0 {
        return Err(anyhow::anyhow!(
            "{} document(s) diverged from expected content",
            diverged
        ));
    }

    Ok(())
}

/// Queue every operation by document and fold each document's batch
pub fn replay_file(file: &ReplayFile) -> Result<Vec<DocumentReplay>> {
    let mut queues = OperationQueues::new();
    for op in &file.operations {
        queues.enqueue(&op.document_id, op.clone())?;
    }

    let mut documents = Vec::new();
    for document_id in file.document_ids() {
        let mut state = DocumentState::new(document_id.clone(), file.base(&document_id));
        let batch = state.apply_batch(&queues.drain_sorted(&document_id));
        debug!(document_id = %document_id, version = batch.version, "Replayed document");

        let operations: Vec<Operation> = batch
            .operations
            .iter()
            .flat_map(|applied| applied.transformed.iter().cloned())
            .collect();

        let cursors = file
            .cursors
            .get(&document_id)
            .map(|cursors| {
                cursors
                    .iter()
                    .map(|&cursor| transform_cursor_through(cursor, &operations))
                    .collect()
            })
            .unwrap_or_default();

        let consistency = file.expected.get(&document_id).map(|expected| {
            state.record_expected(expected.clone(), state.version);
            state.consistency_report(&state.content)
        });

        documents.push(DocumentReplay {
            document_id,
            content: state.content,
            version: state.version,
            operations,
            cursors,
            consistency,
        });
    }

    Ok(documents)
}

fn print_text(file: &ReplayFile, documents: &[DocumentReplay]) {
    for doc in documents {
        println!("📄 {} {}", doc.document_id.bold(), format!("v{}", doc.version).dimmed());
        println!("   {:?}", doc.content);

        for op in &doc.operations {
            println!("   {} {}", "→".cyan(), describe(op));
        }

        if let Some(before) = file.cursors.get(&doc.document_id) {
            for (from, to) in before.iter().zip(&doc.cursors) {
                println!("   {} cursor {} → {}", "↳".cyan(), from, to);
            }
        }

        match &doc.consistency {
            Some(ConsistencyReport::Diverged {
                first_difference, ..
            }) => println!(
                "   {} Diverged from expected content at char {}",
                "✗".red(),
                first_difference
            ),
            Some(_) => println!("   {} Matches expected content", "✓".green()),
            None => {}
        }
        println!();
    }
}
