//! Lexical classification of git refs.
//!
//! A ref is a branch name, a tag name, or a hex SHA. SHA detection never
//! consults a repository: `is_sha` is purely a function of the string.

const BRANCH_REF_PREFIX: &str = "refs/heads/";
const TAG_REF_PREFIX: &str = "refs/tags/";

/// The all-zero object id providers send for created or deleted refs.
pub const NULL_SHA: &str = "0000000000000000000000000000000000000000";

/// True when `value` is 7 to 40 lowercase hex characters.
pub fn is_sha(value: &str) -> bool {
    let len = value.len();
    (7..=40).contains(&len)
        && value
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
}

/// True for an empty object id or the all-zero one.
pub fn is_null_sha(value: &str) -> bool {
    value.is_empty() || value == NULL_SHA
}

/// Strips `refs/heads/` from a fully qualified branch ref.
pub fn normalize_branch_name(reference: &str) -> &str {
    reference
        .strip_prefix(BRANCH_REF_PREFIX)
        .unwrap_or(reference)
}

/// Returns the tag name for `refs/tags/<name>`.
pub fn tag_from_ref(reference: &str) -> Option<&str> {
    reference
        .strip_prefix(TAG_REF_PREFIX)
        .filter(|tag| !tag.is_empty())
}

/// Returns the branch name for `refs/heads/<name>`.
pub fn branch_from_ref(reference: &str) -> Option<&str> {
    reference
        .strip_prefix(BRANCH_REF_PREFIX)
        .filter(|branch| !branch.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{branch_from_ref, is_null_sha, is_sha, normalize_branch_name, tag_from_ref, NULL_SHA};
    use proptest::prelude::*;

    #[test]
    fn unit_is_sha_accepts_short_and_full_hex() {
        assert!(is_sha("abc1234"));
        assert!(is_sha("a1234a1234"));
        assert!(is_sha(&"f".repeat(40)));
    }

    #[test]
    fn regression_is_sha_rejects_branch_like_values() {
        assert!(!is_sha("main"));
        assert!(!is_sha("abc123"));
        assert!(!is_sha(&"a".repeat(41)));
        assert!(!is_sha("ABC1234"));
        assert!(!is_sha("refs/heads/abc1234"));
        assert!(!is_sha(""));
    }

    #[test]
    fn unit_null_sha_is_detected() {
        assert!(is_null_sha(NULL_SHA));
        assert!(is_null_sha(""));
        assert!(!is_null_sha("abc1234"));
        assert!(is_sha(NULL_SHA));
    }

    #[test]
    fn unit_ref_helpers_strip_prefixes() {
        assert_eq!(normalize_branch_name("refs/heads/main"), "main");
        assert_eq!(normalize_branch_name("feature"), "feature");
        assert_eq!(tag_from_ref("refs/tags/v1.0.0"), Some("v1.0.0"));
        assert_eq!(tag_from_ref("refs/tags/"), None);
        assert_eq!(branch_from_ref("refs/heads/dev"), Some("dev"));
        assert_eq!(branch_from_ref("dev"), None);
    }

    proptest! {
        #[test]
        fn functional_is_sha_matches_lexical_definition(value in "[0-9a-fA-Fg-z]{0,45}") {
            let expected = (7..=40).contains(&value.len())
                && value.chars().all(|ch| matches!(ch, '0'..='9' | 'a'..='f'));
            prop_assert_eq!(is_sha(&value), expected);
        }
    }
}
