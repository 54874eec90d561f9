use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use objcache_engine::{Engine, EngineConfig, Walk, WalkReport};
use objcache_store::{Commit, EntryKind, ObjectCache, TreeEntry};
use objcache_types::ObjectId;
use serde::Serialize;
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let engine = Engine::start(&config, Arc::new(ObjectCache::new()))
        .with_context(|| format!("starting `{} {}`", config.program, config.args.join(" ")))?;

    let result = match &cli.command {
        Command::LsTree(args) => cmd_ls_tree(&engine, args, cli.format).await,
        Command::Cat(args) => cmd_cat(&engine, args, cli.format).await,
        Command::Log(args) => cmd_log(&engine, args, cli.format).await,
        Command::Resolve(args) => cmd_resolve(&engine, args, cli.format).await,
        Command::Stats(args) => cmd_stats(&engine, args, cli.format).await,
    };
    let stopped = engine.shutdown().await;
    result?;
    stopped.context("stopping the engine")
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(repo) = &cli.repo {
        config.repository = repo.clone();
    }
    Ok(config)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run a tree walk from `root` and return the tree actually walked.
///
/// A commit id is taken to mean its root tree. Any other non-tree object
/// is an error.
async fn walk_tree(
    engine: &Engine,
    root: ObjectId,
    configure: impl Fn(Walk) -> Walk,
) -> anyhow::Result<(ObjectId, WalkReport)> {
    let report = engine.run_walk(configure(Walk::tree(root))).await?;
    if report.missing.contains(&root) {
        bail!("tree {root} not found");
    }
    if !report.mismatched.contains(&root) {
        return Ok((root, report));
    }

    let tree = commit_tree(engine.cache(), root).with_context(|| format!("{root} is not a tree"))?;
    debug!(commit = %root, %tree, "walking the tree of a commit");
    let report = engine.run_walk(configure(Walk::tree(tree))).await?;
    if report.missing.contains(&tree) || report.mismatched.contains(&tree) {
        bail!("tree {tree} of commit {root} not found");
    }
    Ok((tree, report))
}

fn commit_tree(cache: &ObjectCache, id: ObjectId) -> Option<ObjectId> {
    cache.peek_commit(&id)?.get()?.tree
}

// ---------------------------------------------------------------------------
// ls-tree
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Serialize)]
struct ListingRow {
    path: String,
    mode: String,
    kind: EntryKind,
    id: ObjectId,
    size: Option<usize>,
}

async fn cmd_ls_tree(engine: &Engine, args: &LsTreeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (tree, _) = walk_tree(engine, args.tree, |walk| {
        let walk = walk.blobs(!args.no_blobs);
        match args.depth {
            Some(depth) => walk.max_depth(depth),
            None => walk,
        }
    })
    .await?;

    let rows = listing(engine.cache(), tree, args.depth);
    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Text => {
            for row in &rows {
                let kind = match row.kind {
                    EntryKind::Tree => "tree".blue(),
                    EntryKind::Blob => "blob".normal(),
                };
                let size = row.size.map_or_else(|| "-".to_string(), |s| s.to_string());
                println!("{} {} {} {:>8}\t{}", row.mode, kind, row.id, size.dimmed(), row.path);
            }
            Ok(())
        }
    }
}

/// Rows for every cached entry below `root`, depth first.
fn listing(cache: &ObjectCache, root: ObjectId, max_depth: Option<usize>) -> Vec<ListingRow> {
    let mut rows = Vec::new();
    list_into(cache, root, "", 1, max_depth, &mut rows);
    rows
}

fn list_into(
    cache: &ObjectCache,
    tree: ObjectId,
    prefix: &str,
    depth: usize,
    max_depth: Option<usize>,
    rows: &mut Vec<ListingRow>,
) {
    let Some(entry) = cache.peek_tree(&tree) else {
        return;
    };
    let Some(tree) = entry.get() else {
        return;
    };
    for child in &tree.entries {
        let path = format!("{prefix}{}", child.name);
        let size = match child.kind() {
            EntryKind::Blob => cache
                .peek_blob(&child.id)
                .and_then(|e| e.get().map(|blob| blob.len())),
            EntryKind::Tree => None,
        };
        rows.push(ListingRow {
            path: path.clone(),
            mode: child.mode.to_string(),
            kind: child.kind(),
            id: child.id,
            size,
        });
        if child.kind() == EntryKind::Tree && max_depth.map_or(true, |max| depth < max) {
            list_into(cache, child.id, &format!("{path}/"), depth + 1, max_depth, rows);
        }
    }
}

// ---------------------------------------------------------------------------
// cat
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct BlobView<'a> {
    id: ObjectId,
    size: usize,
    text: &'a str,
}

async fn cmd_cat(engine: &Engine, args: &CatArgs, format: OutputFormat) -> anyhow::Result<()> {
    let Some(entry) = engine.lookup_blob(args.blob).await? else {
        bail!("blob {} not found", args.blob);
    };
    let Some(blob) = entry.get() else {
        bail!("blob {} not loaded", args.blob);
    };
    match format {
        OutputFormat::Json => print_json(&BlobView {
            id: args.blob,
            size: blob.len(),
            text: &blob.text(),
        }),
        OutputFormat::Text => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&blob.data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// log
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LogEntry<'a> {
    id: ObjectId,
    #[serde(flatten)]
    commit: &'a Commit,
}

async fn cmd_log(engine: &Engine, args: &LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let depth = args.limit.saturating_sub(1);
    if engine.lookup_commit(args.commit, depth).await?.is_none() {
        bail!("commit {} not found", args.commit);
    }
    let commits = history(engine.cache(), args.commit, args.limit);

    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = commits
                .iter()
                .map(|(id, commit)| LogEntry { id: *id, commit })
                .collect();
            print_json(&entries)
        }
        OutputFormat::Text => {
            for (id, commit) in &commits {
                println!("{} {}", "commit".yellow(), id.to_string().yellow());
                if commit.parents.len() > 1 {
                    let parents: Vec<_> = commit.parents.iter().map(ObjectId::short_hex).collect();
                    println!("Merge:  {}", parents.join(" "));
                }
                if let Some(author) = &commit.author {
                    println!("Author: {} <{}>", author.name, author.email);
                }
                if let Some(when) = commit.timestamp() {
                    println!("Date:   {}", when.format("%a %b %e %H:%M:%S %Y %z"));
                }
                println!();
                for line in commit.message.lines() {
                    println!("    {line}");
                }
                println!();
            }
            Ok(())
        }
    }
}

/// Cached ancestors of `head`, newest first, at most `limit` of them.
fn history(cache: &ObjectCache, head: ObjectId, limit: usize) -> Vec<(ObjectId, Commit)> {
    let mut seen = HashSet::new();
    let mut frontier = vec![head];
    let mut commits = Vec::new();
    while let Some(id) = frontier.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(commit) = cache.peek_commit(&id).and_then(|e| e.get().cloned()) else {
            continue;
        };
        frontier.extend(commit.parents.iter().copied());
        commits.push((id, commit));
    }
    commits.sort_by(|a, b| b.1.timestamp().cmp(&a.1.timestamp()));
    commits.truncate(limit);
    commits
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

async fn cmd_resolve(engine: &Engine, args: &ResolveArgs, format: OutputFormat) -> anyhow::Result<()> {
    let Some(entry) = engine.lookup_path(args.tree, &args.path).await? else {
        bail!("path {:?} not found below {}", args.path, args.tree);
    };
    match format {
        OutputFormat::Json => print_json(&entry),
        OutputFormat::Text => {
            print_entry(&entry, &args.path);
            Ok(())
        }
    }
}

fn print_entry(entry: &TreeEntry, path: &str) {
    let kind = match entry.kind() {
        EntryKind::Tree => "tree".blue(),
        EntryKind::Blob => "blob".normal(),
    };
    println!("{} {} {}\t{}", entry.mode, kind, entry.id, path.trim_matches('/'));
}

// ---------------------------------------------------------------------------
// stats
// ---------------------------------------------------------------------------

async fn cmd_stats(engine: &Engine, args: &StatsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (_, report) = walk_tree(engine, args.tree, |walk| walk).await?;
    let stats = engine.cache().stats();

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "walk": report,
            "cache": stats,
        })),
        OutputFormat::Text => {
            println!(
                "{} fetched {}, cached {}, missing {}",
                "✓".green().bold(),
                report.fetched.to_string().bold(),
                report.cached,
                report.missing.len()
            );
            for id in &report.missing {
                println!("  {} {}", "missing".red(), id);
            }
            println!("{:<8} {:>8} {:>8}", "kind", "entries", "valid");
            for (kind, counts) in [("blob", stats.blobs), ("tree", stats.trees), ("commit", stats.commits)] {
                println!("{:<8} {:>8} {:>8}", kind, counts.entries, counts.valid);
            }
            Ok(())
        }
    }
}
