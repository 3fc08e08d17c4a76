use anyhow::{Context, Result};
use clap::ValueEnum;
use inkwell_ot::Operation;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// A recorded batch: base texts, wire operations and optional checks
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFile {
    /// Base content per document id (missing documents start empty)
    #[serde(default)]
    pub documents: BTreeMap<String, String>,

    /// Wire payloads, in arrival order
    pub operations: Vec<Operation>,

    /// Cursor offsets into the base content, carried through the batch
    #[serde(default)]
    pub cursors: BTreeMap<String, Vec<usize>>,

    /// Content every client should hold afterwards
    #[serde(default)]
    pub expected: BTreeMap<String, String>,
}

impl ReplayFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid replay file {}", path.display()))
    }

    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Every document named by a base text or an operation, sorted
    pub fn document_ids(&self) -> Vec<String> {
        let ids: BTreeSet<&str> = self
            .documents
            .keys()
            .map(String::as_str)
            .chain(self.operations.iter().map(|op| op.document_id.as_str()))
            .collect();
        ids.into_iter().map(str::to_string).collect()
    }

    pub fn base(&self, document_id: &str) -> &str {
        self.documents
            .get(document_id)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn operations_for<'a>(&'a self, document_id: &'a str) -> impl Iterator<Item = &'a Operation> {
        self.operations
            .iter()
            .filter(move |op| op.document_id == document_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// One-line summary of an operation for text output
pub fn describe(op: &Operation) -> String {
    match op.content() {
        Some(content) if op.length() > 0 => format!(
            "{} {} @{} len {} {:?}",
            op.author_id,
            op.kind(),
            op.position(),
            op.length(),
            content
        ),
        Some(content) => format!("{} {} @{} {:?}", op.author_id, op.kind(), op.position(), content),
        None => format!(
            "{} {} @{} len {}",
            op.author_id,
            op.kind(),
            op.position(),
            op.length()
        ),
    }
}
