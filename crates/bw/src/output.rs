use chrono::Local;
use owo_colors::{OwoColorize, Stream::Stdout};
use serde::Serialize;

use bw_events::{Diff, Flat};
use bw_git::{CommitInfo, RebaseResult, RebaseStatus};

use crate::commands::git::GitResult;
use crate::commands::replay::ReplayResult;
use crate::error::Result;

pub fn json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn git(result: &GitResult, as_json: bool) -> Result<()> {
    match result {
        GitResult::Diff { diff, patch } => {
            if as_json {
                return json(diff);
            }
            print_diff(diff, *patch);
        }
        GitResult::Ancestor(id) | GitResult::CherryPick(id) => {
            if as_json {
                return json(id);
            }
            println!("{id}");
        }
        GitResult::Rebase(result) => {
            if as_json {
                return json(result);
            }
            print_rebase(result);
        }
        GitResult::Resolve(info) => {
            if as_json {
                return json(info);
            }
            print_commit(info);
        }
    }
    Ok(())
}

fn print_diff(diff: &Diff, patch: bool) {
    let files = &diff.files;
    for path in &files.added {
        println!("{} {path}", "A".if_supports_color(Stdout, |t| t.green()));
    }
    for path in &files.deleted {
        println!("{} {path}", "D".if_supports_color(Stdout, |t| t.red()));
    }
    for path in &files.modified {
        println!("{} {path}", "M".if_supports_color(Stdout, |t| t.yellow()));
    }
    for path in &files.renamed {
        println!("{} {path}", "R".if_supports_color(Stdout, |t| t.cyan()));
    }
    let added = format!("+{}", diff.lines.added);
    let removed = format!("-{}", diff.lines.removed);
    println!(
        "{} files, {} {}",
        files.count(),
        added.if_supports_color(Stdout, |t| t.green()),
        removed.if_supports_color(Stdout, |t| t.red()),
    );
    if !diff.commits.conflict_at.is_empty() {
        println!("merge-base {}", short(&diff.commits.conflict_at));
    }
    if patch && !diff.patch.is_empty() {
        println!();
        print!("{}", diff.patch);
    }
}

fn print_rebase(result: &RebaseResult) {
    for operation in &result.operations {
        println!(
            "{:<10} {} {}",
            status(operation.status),
            short(&operation.head).if_supports_color(Stdout, |t| t.dimmed()),
            operation.message
        );
        if let Some(error) = &operation.error {
            println!("           {}", error.if_supports_color(Stdout, |t| t.dimmed()));
        }
    }
    for path in &result.conflicts {
        println!("{} {path}", "C".if_supports_color(Stdout, |t| t.red()));
    }
    println!("{} -> {}", status(result.status), short(&result.head));
}

fn print_commit(info: &CommitInfo) {
    println!("{}", info.id.if_supports_color(Stdout, |t| t.yellow()));
    println!("tree    {}", info.tree);
    for parent in &info.parents {
        println!("parent  {parent}");
    }
    println!("author  {} <{}> {}", info.author_name, info.author_email, info.author_time);
    println!();
    for line in info.message.lines() {
        println!("    {line}");
    }
}

fn status(status: RebaseStatus) -> String {
    let label = status.to_string();
    match status {
        RebaseStatus::UpToDate | RebaseStatus::Success => {
            label.if_supports_color(Stdout, |t| t.green()).to_string()
        }
        RebaseStatus::Partial => label.if_supports_color(Stdout, |t| t.yellow()).to_string(),
        RebaseStatus::Conflicts | RebaseStatus::Aborted | RebaseStatus::Failure => {
            label.if_supports_color(Stdout, |t| t.red()).to_string()
        }
    }
}

pub fn replay(result: &ReplayResult, as_json: bool) -> Result<()> {
    if as_json {
        return json(result);
    }
    println!(
        "{} records: {} dispatched, {} skipped, {} events stored",
        result.records, result.dispatched, result.skipped, result.stored
    );
    Ok(())
}

pub fn events(events: &[Flat], as_json: bool) -> Result<()> {
    if as_json {
        return json(&events);
    }
    for event in events {
        let parent = event
            .parent_id
            .as_ref()
            .map(|parent| format!(" <- {parent}"))
            .unwrap_or_default();
        println!(
            "{} {} {}.{} {}{}",
            event.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            event.id.if_supports_color(Stdout, |t| t.yellow()),
            event.scope,
            event.action,
            event.payload_kind,
            parent.if_supports_color(Stdout, |t| t.dimmed()),
        );
    }
    Ok(())
}

fn short(id: &str) -> &str {
    id.get(..10).unwrap_or(id)
}
