use bstr::ByteSlice;
use gix::ObjectId;
use serde::Serialize;

use crate::error::{Cause, Op, ResolveError, backend};
use crate::repository::Repository;

/// A resolved commit with the fields the engine needs to re-create it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub id: String,
    pub tree: String,
    pub parents: Vec<String>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Seconds since the unix epoch plus the original offset, as git stores it.
    pub author_time: String,
}

impl Repository {
    fn resolve_error(&self, reference: &str, cause: impl Into<Cause>) -> ResolveError {
        ResolveError {
            op: Op::Resolve,
            repo_id: self.repo_id().to_string(),
            reference: reference.to_string(),
            cause: cause.into(),
        }
    }

    /// Resolves any revision expression (`HEAD`, `main`, `v1.0`, `HEAD~2`,
    /// `HEAD^{/fix}`, a hash prefix) to the object it names, without peeling.
    pub fn resolve_revision(&mut self, rev: &str) -> Result<String, ResolveError> {
        let repo = self
            .handle()
            .map_err(|err| self.resolve_error(rev, err))?;
        let id = repo
            .rev_parse_single(rev)
            .map_err(|_| self.resolve_error(rev, Cause::NotFound))?;
        Ok(id.detach().to_string())
    }

    /// Resolves `rev` to a commit. Annotated tags are peeled; anything that
    /// does not end in a commit is rejected.
    pub fn resolve_commit(&mut self, rev: &str) -> Result<CommitInfo, ResolveError> {
        let repo = self
            .handle()
            .map_err(|err| self.resolve_error(rev, err))?;
        let id = repo
            .rev_parse_single(rev)
            .map_err(|_| self.resolve_error(rev, Cause::NotFound))?;
        let object = id
            .object()
            .map_err(|err| self.resolve_error(rev, backend("load object")(err)))?
            .peel_tags_to_end()
            .map_err(|err| self.resolve_error(rev, backend("peel tag")(err)))?;
        if object.kind != gix::object::Kind::Commit {
            return Err(self.resolve_error(rev, Cause::NotACommit(object.kind.to_string())));
        }
        let commit = object.into_commit();
        commit_info(&commit).map_err(|cause| self.resolve_error(rev, cause))
    }

    pub(crate) fn resolve_commit_id(&mut self, rev: &str) -> Result<ObjectId, ResolveError> {
        let info = self.resolve_commit(rev)?;
        ObjectId::from_hex(info.id.as_bytes())
            .map_err(|err| self.resolve_error(rev, backend("object id")(err)))
    }
}

fn commit_info(commit: &gix::Commit<'_>) -> Result<CommitInfo, Cause> {
    let decoded = commit.decode().map_err(backend("decode commit"))?;
    let author = decoded.author().map_err(backend("commit author"))?;
    let time = author.time().map_err(backend("author time"))?;
    Ok(CommitInfo {
        id: commit.id.to_string(),
        tree: decoded.tree().to_string(),
        parents: decoded.parents().map(|id| id.to_string()).collect(),
        message: decoded.message.to_str_lossy().to_string(),
        author_name: author.name.to_str_lossy().to_string(),
        author_email: author.email.to_str_lossy().to_string(),
        author_time: format!("@{} {}", time.seconds, format_offset(time.offset)),
    })
}

fn format_offset(offset_seconds: i32) -> String {
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let minutes = offset_seconds.unsigned_abs() / 60;
    format!("{sign}{:02}{:02}", minutes / 60, minutes % 60)
}
