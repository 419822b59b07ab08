use bw_events::payloads::{Diff, DiffCommits, DiffFiles, DiffLines};
use gix::ObjectId;
use gix::bstr::ByteSlice;
use gix::diff::blob::intern::InternedInput;
use gix::diff::blob::sink::Counter;
use gix::diff::blob::sources::lines_with_terminator;
use gix::diff::blob::{Algorithm, UnifiedDiffBuilder};
use gix::object::tree::diff::ChangeDetached;
use gix::objs::tree::{EntryKind, EntryMode};
use std::fmt::Write as _;

use crate::error::{Cause, CompareError, Op, backend};
use crate::repository::Repository;

impl Repository {
    fn compare_error(&self, op: Op, from: &str, to: &str, cause: impl Into<Cause>) -> CompareError {
        CompareError {
            op,
            repo_id: self.repo_id().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            cause: cause.into(),
        }
    }

    /// Best common ancestor of `a` and `b`.
    pub fn ancestor(&mut self, a: &str, b: &str) -> Result<String, CompareError> {
        let left = self
            .resolve_commit_id(a)
            .map_err(|err| self.compare_error(Op::Ancestor, a, b, err))?;
        let right = self
            .resolve_commit_id(b)
            .map_err(|err| self.compare_error(Op::Ancestor, a, b, err))?;
        let repo = self
            .handle()
            .map_err(|err| self.compare_error(Op::Ancestor, a, b, err))?;
        let base = repo
            .merge_base(left, right)
            .map_err(|_| self.compare_error(Op::Ancestor, a, b, Cause::NoMergeBase))?;
        Ok(base.detach().to_string())
    }

    /// Compares `from` against `to`: the unified patch, per-bucket file lists,
    /// line totals and the merge-base of the two sides.
    ///
    /// Failures are reported as `Op::Diff`, except a failed merge-base lookup,
    /// which is returned unchanged as `Op::Ancestor`. Unrelated histories are
    /// not a failure: `conflict_at` is left empty and `has_conflict` is set.
    pub fn diff(&mut self, from: &str, to: &str) -> Result<Diff, CompareError> {
        let base_id = self
            .resolve_commit_id(from)
            .map_err(|err| self.compare_error(Op::Diff, from, to, err))?;
        let head_id = self
            .resolve_commit_id(to)
            .map_err(|err| self.compare_error(Op::Diff, from, to, err))?;
        let repo = self
            .handle()
            .map_err(|err| self.compare_error(Op::Diff, from, to, err))?;
        let wrap = |cause: Cause| self.compare_error(Op::Diff, from, to, cause);

        let base_tree = repo
            .find_commit(base_id)
            .map_err(backend("load base commit"))
            .and_then(|commit| commit.tree().map_err(backend("base tree")))
            .map_err(wrap)?;
        let head_tree = repo
            .find_commit(head_id)
            .map_err(backend("load head commit"))
            .and_then(|commit| commit.tree().map_err(backend("head tree")))
            .map_err(wrap)?;

        let changes = repo
            .diff_tree_to_tree(&base_tree, &head_tree, None)
            .map_err(|err| wrap(backend("tree diff")(err)))?;

        let mut files = DiffFiles::default();
        let mut lines = DiffLines::default();
        let mut patch = String::new();
        for change in changes {
            let Some(file) = file_change(&repo, change).map_err(wrap)? else {
                continue;
            };
            let counted = append_unified_diff(
                &mut patch,
                &file.old_path,
                &file.new_path,
                file.old_text.as_deref(),
                file.new_text.as_deref(),
            )
            .map_err(wrap)?;
            lines.added = lines.added.saturating_add(counted.insertions);
            lines.removed = lines.removed.saturating_add(counted.removals);
            match file.bucket {
                Bucket::Added => files.added.push(file.new_path),
                Bucket::Deleted => files.deleted.push(file.old_path),
                Bucket::Modified => files.modified.push(file.new_path),
                Bucket::Renamed => files
                    .renamed
                    .push(format!("{} => {}", file.old_path, file.new_path)),
            }
        }

        let conflict_at = match self.ancestor(from, to) {
            Ok(base) => base,
            Err(CompareError {
                cause: Cause::NoMergeBase,
                ..
            }) => String::new(),
            Err(err) => return Err(err),
        };
        // Literal predicate, inverted from its name: true only when the two
        // sides share no history.
        let has_conflict = conflict_at.is_empty();

        Ok(Diff {
            files,
            lines,
            commits: DiffCommits {
                base: base_id.to_string(),
                head: head_id.to_string(),
                conflict_at,
            },
            patch,
            has_conflict,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Added,
    Deleted,
    Modified,
    Renamed,
}

struct FileChange {
    bucket: Bucket,
    old_path: String,
    new_path: String,
    old_text: Option<String>,
    new_text: Option<String>,
}

struct LineCount {
    insertions: i32,
    removals: i32,
}

fn file_change(repo: &gix::Repository, change: ChangeDetached) -> Result<Option<FileChange>, Cause> {
    let file = match change {
        ChangeDetached::Addition {
            location,
            entry_mode,
            id,
            ..
        } => {
            if !is_blob_entry(entry_mode) {
                return Ok(None);
            }
            let path = location.to_str_lossy().to_string();
            FileChange {
                bucket: Bucket::Added,
                old_path: path.clone(),
                new_path: path,
                old_text: None,
                new_text: Some(blob_text(repo, id)?),
            }
        }
        ChangeDetached::Deletion {
            location,
            entry_mode,
            id,
            ..
        } => {
            if !is_blob_entry(entry_mode) {
                return Ok(None);
            }
            let path = location.to_str_lossy().to_string();
            FileChange {
                bucket: Bucket::Deleted,
                old_path: path.clone(),
                new_path: path,
                old_text: Some(blob_text(repo, id)?),
                new_text: None,
            }
        }
        ChangeDetached::Modification {
            location,
            previous_entry_mode,
            entry_mode,
            previous_id,
            id,
            ..
        } => {
            if !is_blob_entry(entry_mode) || !is_blob_entry(previous_entry_mode) {
                return Ok(None);
            }
            let path = location.to_str_lossy().to_string();
            FileChange {
                bucket: Bucket::Modified,
                old_path: path.clone(),
                new_path: path,
                old_text: Some(blob_text(repo, previous_id)?),
                new_text: Some(blob_text(repo, id)?),
            }
        }
        ChangeDetached::Rewrite {
            source_location,
            location,
            source_entry_mode,
            entry_mode,
            source_id,
            id,
            ..
        } => {
            if !is_blob_entry(entry_mode) || !is_blob_entry(source_entry_mode) {
                return Ok(None);
            }
            let old_path = source_location.to_str_lossy().to_string();
            let new_path = location.to_str_lossy().to_string();
            let bucket = if old_path == new_path {
                Bucket::Modified
            } else {
                Bucket::Renamed
            };
            FileChange {
                bucket,
                old_path,
                new_path,
                old_text: Some(blob_text(repo, source_id)?),
                new_text: Some(blob_text(repo, id)?),
            }
        }
    };
    Ok(Some(file))
}

fn is_blob_entry(mode: EntryMode) -> bool {
    matches!(
        EntryKind::from(mode),
        EntryKind::Blob | EntryKind::BlobExecutable
    )
}

fn blob_text(repo: &gix::Repository, id: ObjectId) -> Result<String, Cause> {
    let blob = repo.find_blob(id).map_err(backend("load blob"))?;
    Ok(String::from_utf8_lossy(&blob.data).to_string())
}

fn append_unified_diff(
    output: &mut String,
    old_path: &str,
    new_path: &str,
    old_text: Option<&str>,
    new_text: Option<&str>,
) -> Result<LineCount, Cause> {
    writeln!(output, "diff --git a/{old_path} b/{new_path}").map_err(backend("write diff"))?;
    let left_header = if old_text.is_some() {
        format!("a/{old_path}")
    } else {
        "/dev/null".to_string()
    };
    let right_header = if new_text.is_some() {
        format!("b/{new_path}")
    } else {
        "/dev/null".to_string()
    };
    writeln!(output, "--- {left_header}").map_err(backend("write diff"))?;
    writeln!(output, "+++ {right_header}").map_err(backend("write diff"))?;

    let diff = diff_text(old_text, new_text);
    if !diff.wrapped.is_empty() {
        output.push_str(diff.wrapped.as_str());
        if !output.ends_with('\n') {
            output.push('\n');
        }
    }
    Ok(LineCount {
        insertions: i32::try_from(diff.insertions).unwrap_or(i32::MAX),
        removals: i32::try_from(diff.removals).unwrap_or(i32::MAX),
    })
}

fn diff_text(old_text: Option<&str>, new_text: Option<&str>) -> Counter<String> {
    let input = InternedInput::new(
        lines_with_terminator(old_text.unwrap_or_default()),
        lines_with_terminator(new_text.unwrap_or_default()),
    );
    gix::diff::blob::diff(
        Algorithm::Histogram,
        &input,
        Counter::new(UnifiedDiffBuilder::new(&input)),
    )
}
