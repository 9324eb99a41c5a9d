//! Deterministic domain identifiers.

use crate::state::ConnectionId;

/// Identity of a tool record as seen by the domain layer.
///
/// `plugin` and `model` are plain identifiers and must not contain `:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolIdentity<'a> {
    pub plugin: &'a str,
    pub model: &'a str,
    pub primary_key: &'a str,
}

/// Build the domain id for a tool record seen through `connection_id`.
///
/// Output is `<plugin>:<model>:<connection_id>:<primary_key>`. The first
/// three segments never contain `:`, so distinct inputs never produce the
/// same id.
#[must_use]
pub fn generate_domain_id(tool: ToolIdentity<'_>, connection_id: ConnectionId) -> String {
    debug_assert!(!tool.plugin.contains(':'), "plugin name must not contain ':'");
    debug_assert!(!tool.model.contains(':'), "model name must not contain ':'");
    format!(
        "{}:{}:{}:{}",
        tool.plugin, tool.model, connection_id, tool.primary_key
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(pk: &str) -> ToolIdentity<'_> {
        ToolIdentity {
            plugin: "github",
            model: "GithubIssue",
            primary_key: pk,
        }
    }

    #[test]
    fn same_input_same_id() {
        let a = generate_domain_id(issue("42"), ConnectionId::new(1));
        let b = generate_domain_id(issue("42"), ConnectionId::new(1));
        assert_eq!(a, b);
        assert_eq!(a, "github:GithubIssue:1:42");
    }

    #[test]
    fn connection_changes_id() {
        let a = generate_domain_id(issue("42"), ConnectionId::new(1));
        let b = generate_domain_id(issue("42"), ConnectionId::new(2));
        assert_ne!(a, b);
    }

    #[test]
    fn primary_key_with_separator_does_not_collide() {
        let a = generate_domain_id(issue("1:2"), ConnectionId::new(3));
        let b = generate_domain_id(issue("2"), ConnectionId::new(31));
        assert_ne!(a, b);
    }
}
