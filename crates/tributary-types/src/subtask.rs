//! Subtask verbs, naming and registration metadata.

use serde::{Deserialize, Serialize};

use crate::state::SubtaskName;

/// The pipeline role of a subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Collect,
    Extract,
    Convert,
}

impl Verb {
    /// All verbs in pipeline order.
    pub const ALL: [Verb; 3] = [Verb::Collect, Verb::Extract, Verb::Convert];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Extract => "extract",
            Self::Convert => "convert",
        }
    }

    /// Subtask name for this verb over `plugin`/`stream`,
    /// e.g. `collectGithubIssues`.
    #[must_use]
    pub fn subtask_name(self, plugin: &str, stream: &str) -> SubtaskName {
        SubtaskName::new(format!(
            "{}{}{}",
            self.as_str(),
            capitalize(plugin),
            capitalize(stream)
        ))
    }

    /// Human description, e.g. `Collect github issues`.
    #[must_use]
    pub fn describe(self, plugin: &str, stream: &str) -> String {
        format!(
            "{} {} {}",
            capitalize(self.as_str()),
            plugin,
            stream.to_lowercase()
        )
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "collect" => Ok(Self::Collect),
            "extract" => Ok(Self::Extract),
            "convert" => Ok(Self::Convert),
            other => Err(format!("unknown subtask verb '{other}'")),
        }
    }
}

/// Upper-case the first character, lower-case the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Registration metadata for one subtask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskMeta {
    pub name: SubtaskName,
    pub entry_point_name: Verb,
    pub arguments: Vec<String>,
    pub required: bool,
    pub enabled_by_default: bool,
    pub description: String,
    pub domain_types: Vec<String>,
}
