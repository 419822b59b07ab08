//! Branch and ref name helpers.

pub const HEADS_PREFIX: &str = "refs/heads/";
pub const REMOTES_PREFIX: &str = "refs/remotes/";

/// Namespace for branches the engine creates and owns.
pub const MANAGED_PREFIX: &str = "qtm/";

pub fn branch_name_from_ref(reference: &str) -> &str {
    reference.strip_prefix(HEADS_PREFIX).unwrap_or(reference)
}

pub fn branch_name_to_ref(branch: &str) -> String {
    format!("{HEADS_PREFIX}{branch}")
}

pub fn branch_name_to_remote_ref(remote: &str, branch: &str) -> String {
    format!("{REMOTES_PREFIX}{remote}/{branch}")
}

pub fn create_managed_ref(branch: &str) -> String {
    format!("{HEADS_PREFIX}{MANAGED_PREFIX}{branch}")
}

pub fn is_managed_ref(reference: &str) -> bool {
    reference
        .strip_prefix(HEADS_PREFIX)
        .is_some_and(is_managed_branch)
}

pub fn is_managed_branch(branch: &str) -> bool {
    branch.starts_with(MANAGED_PREFIX)
}

pub fn is_branch_ref(reference: &str) -> bool {
    reference.starts_with(HEADS_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_ref_round_trip() {
        for reference in ["refs/heads/main", "refs/heads/feature/x", "refs/heads/qtm/a"] {
            assert_eq!(branch_name_to_ref(branch_name_from_ref(reference)), reference);
        }
    }

    #[test]
    fn non_branch_refs_pass_through() {
        assert_eq!(branch_name_from_ref("refs/tags/v1"), "refs/tags/v1");
        assert_eq!(branch_name_from_ref("main"), "main");
        assert!(!is_branch_ref("refs/tags/v1"));
    }

    #[test]
    fn remote_ref() {
        assert_eq!(
            branch_name_to_remote_ref("origin", "main"),
            "refs/remotes/origin/main"
        );
    }

    #[test]
    fn managed_namespace() {
        let reference = create_managed_ref("feature");
        assert_eq!(reference, "refs/heads/qtm/feature");
        assert!(is_managed_ref(&reference));
        assert!(!is_managed_ref("refs/heads/feature"));
        assert!(!is_managed_ref("refs/tags/qtm/feature"));
        assert!(is_managed_branch("qtm/feature"));
        assert!(!is_managed_branch("feature"));
    }
}
