//! Validated agent names.
//!
//! An agent name is the pool key and the stem of the agent's definition
//! file. Skill and expertise references from a definition's front matter
//! are validated with the same rules before they touch the file system.

use std::fmt::{Display, Formatter};

use crate::{AppError, Result};

/// Name of an agent definition, safe to use as a single file-name component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentName(String);

impl AgentName {
    /// Validate `raw` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathTraversal` if the name is empty, starts with
    /// `.`, contains `..`, a path separator, or a NUL byte.
    pub fn parse(raw: &str) -> Result<Self> {
        validate_component(raw, "agent")?;
        Ok(Self(raw.to_owned()))
    }

    /// Borrow the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of this agent's definition (`<name>.md`).
    #[must_use]
    pub fn definition_file(&self) -> String {
        format!("{}.md", self.0)
    }
}

impl Display for AgentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AgentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check that `raw` is usable as one file-name component under a trusted root.
///
/// `kind` labels the error message (`agent`, `skill`, `expertise`).
///
/// # Errors
///
/// Returns `AppError::PathTraversal` describing the first violated rule.
pub fn validate_component(raw: &str, kind: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(AppError::PathTraversal(format!("{kind} name is empty")));
    }
    if raw.contains("..") {
        return Err(AppError::PathTraversal(format!(
            "invalid {kind} name '{raw}': parent directory reference"
        )));
    }
    if raw.contains(['/', '\\', '\0']) {
        return Err(AppError::PathTraversal(format!(
            "invalid {kind} name '{raw}': path separator"
        )));
    }
    if raw.starts_with('.') {
        return Err(AppError::PathTraversal(format!(
            "invalid {kind} name '{raw}': hidden file"
        )));
    }
    Ok(())
}
