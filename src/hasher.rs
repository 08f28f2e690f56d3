//! Rule fingerprinting.
//!
//! [`RuleHasher`] computes a stable SHA-256 digest for an
//! [`OutputRuleSpec`]. Generators use it to name the emitted rule so that an
//! unchanged declaration keeps its name across runs.
//!
//! # Examples
//!
//! ```
//! use rulegraph::ast::Invocation;
//! use rulegraph::hasher::RuleHasher;
//! use rulegraph::rule::OutputRuleSpec;
//!
//! let rule = OutputRuleSpec::new(vec!["out".into()], vec![Invocation::new("touch")]);
//! let hash = RuleHasher::hash(&rule);
//! assert_eq!(hash.len(), 64);
//! ```

use sha2::{Digest, Sha256};

use crate::ast::Invocation;
use crate::rule::OutputRuleSpec;

/// Computes stable digests for [`OutputRuleSpec`] values.
pub struct RuleHasher;

impl RuleHasher {
    /// Calculate the hash of a rule.
    ///
    /// Every field that changes what the rule does or produces contributes;
    /// the comment does not.
    #[must_use]
    pub fn hash(rule: &OutputRuleSpec) -> String {
        let mut hasher = Sha256::new();
        Self::hash_list(&mut hasher, b"out", rule.outputs.iter().map(|p| p.as_str()));
        Self::hash_list(
            &mut hasher,
            b"dep",
            rule.dependencies.iter().map(|p| p.as_str()),
        );
        Self::hash_command_line(&mut hasher, &rule.command_line);
        hasher.update(b"cwd");
        Self::update_with_len(&mut hasher, rule.working_directory.as_str().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The first `len` hex digits of [`Self::hash`].
    #[must_use]
    pub fn short(rule: &OutputRuleSpec, len: usize) -> String {
        Self::hash(rule).chars().take(len).collect()
    }

    fn hash_command_line(hasher: &mut Sha256, command_line: &[Invocation]) {
        hasher.update(b"cmd");
        Self::update_with_len(hasher, command_line.len().to_string().as_bytes());
        for invocation in command_line {
            Self::update_with_len(hasher, invocation.executable.as_bytes());
            Self::hash_list(hasher, b"arg", invocation.args.iter().map(String::as_str));
        }
    }

    fn hash_list<'a>(hasher: &mut Sha256, tag: &[u8], items: impl ExactSizeIterator<Item = &'a str>) {
        hasher.update(tag);
        Self::update_with_len(hasher, items.len().to_string().as_bytes());
        for item in items {
            Self::update_with_len(hasher, item.as_bytes());
        }
    }

    fn update_with_len(hasher: &mut Sha256, bytes: &[u8]) {
        let len = bytes.len();
        hasher.update(format!("{len}:").as_bytes());
        hasher.update(bytes);
    }
}
