use super::input::{describe, OutputFormat};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use inkwell_ot::{Conflict, ConflictResolver, Operation, ResolutionStrategy};
use inkwell_session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Pair file (JSON): two operations, optional priorities and base
    pub input: PathBuf,

    /// Strategy (defaults to `defaultStrategy` from inkwell.config.json)
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    TimestampPriority,
    UserPriority,
}

impl From<StrategyArg> for ResolutionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::TimestampPriority => ResolutionStrategy::TimestampPriority,
            StrategyArg::UserPriority => ResolutionStrategy::UserPriority,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairFile {
    pub operations: Vec<Operation>,

    /// Author ranking for `user_priority`
    #[serde(default)]
    pub priorities: HashMap<String, i64>,

    /// When present, both operations are applied to it
    #[serde(default)]
    pub base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResolution {
    pub strategy: ResolutionStrategy,
    pub winning_operation: Operation,
    pub transformed_operations: Vec<Operation>,
    pub conflicts: Vec<Conflict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

pub fn resolve(args: ResolveArgs, cwd: &Path) -> Result<()> {
    let strategy = match args.strategy {
        Some(strategy) => strategy.into(),
        None => SessionConfig::load(cwd)?.default_strategy,
    };

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let pair: PairFile = serde_json::from_str(&source)
        .with_context(|| format!("Invalid pair file {}", args.input.display()))?;

    let resolution = resolve_pair(pair, strategy)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolution)?),
        OutputFormat::Text => print_text(&resolution),
    }

    Ok(())
}

pub fn resolve_pair(pair: PairFile, strategy: ResolutionStrategy) -> Result<PairResolution> {
    let [a, b] = <[Operation; 2]>::try_from(pair.operations).map_err(|ops| {
        anyhow::anyhow!("Expected exactly 2 operations, found {}", ops.len())
    })?;

    let resolver = ConflictResolver::new().with_priorities(pair.priorities);
    let resolution = match &pair.base {
        Some(base) => resolver.resolve_with_on(base, &a, &b, strategy),
        None => resolver.resolve_with(&a, &b, strategy),
    };

    let content = pair.base.map(|base| {
        resolution
            .transformed_operations
            .iter()
            .fold(resolution.winning_operation.apply(&base), |content, op| {
                op.apply(&content)
            })
    });

    Ok(PairResolution {
        strategy: resolution.strategy,
        winning_operation: resolution.winning_operation,
        transformed_operations: resolution.transformed_operations,
        conflicts: resolution.conflicts,
        content,
    })
}

fn print_text(resolution: &PairResolution) {
    println!("⚖️  {} ({})", "Resolved".green().bold(), resolution.strategy);
    println!("   {} {}", "winner:".bold(), describe(&resolution.winning_operation));
    for op in &resolution.transformed_operations {
        println!("   {} {}", "then:".bold(), describe(op));
    }

    if resolution.conflicts.is_empty() {
        println!("   {} No overlap", "✓".green());
    }
    for conflict in &resolution.conflicts {
        println!(
            "   {} {:?} at {} ({} / {})",
            "!".yellow(),
            conflict.kind,
            conflict.position,
            conflict.authors.0,
            conflict.authors.1
        );
    }

    if let Some(content) = &resolution.content {
        println!("   {:?}", content);
    }
}
