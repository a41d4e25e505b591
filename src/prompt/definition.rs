//! Agent definition parsing.
//!
//! A definition is Markdown with an optional YAML front-matter block:
//!
//! ```text
//! ---
//! name: reviewer
//! skills:
//!   - git-workflow
//!   - rust-style
//! expertise: [security]
//! ---
//! You are a careful code reviewer...
//! ```
//!
//! Only `skills` and `expertise` are interpreted; other keys are ignored.
//! Everything after the closing marker is the body, kept verbatim.

use serde::Deserialize;

/// Line that opens and closes the front-matter block.
pub const FRONT_MATTER_MARKER: &str = "---";

/// Parsed agent definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentDefinition {
    /// Skill names in listed order.
    pub skills: Vec<String>,
    /// Expertise names in listed order.
    pub expertise: Vec<String>,
    /// Agent instructions following the front matter.
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    skills: Option<NameList>,
    #[serde(default)]
    expertise: Option<NameList>,
}

/// A list of names, or a single bare name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameList {
    One(String),
    Many(Vec<String>),
}

impl NameList {
    fn into_names(list: Option<Self>) -> Vec<String> {
        let raw = match list {
            None => Vec::new(),
            Some(Self::One(name)) => vec![name],
            Some(Self::Many(names)) => names,
        };
        raw.into_iter()
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

impl AgentDefinition {
    /// Parse a definition file's contents.
    ///
    /// A file without a complete front-matter block is all body.
    ///
    /// # Errors
    ///
    /// Returns the YAML error if the front matter is present but is not a
    /// mapping with string-list `skills` and `expertise` values.
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        let Some((block, body)) = split_front_matter(content) else {
            return Ok(Self {
                body: content.to_owned(),
                ..Self::default()
            });
        };

        let front: FrontMatter = if is_blank_yaml(block) {
            FrontMatter::default()
        } else {
            serde_yaml::from_str(block)?
        };

        Ok(Self {
            skills: NameList::into_names(front.skills),
            expertise: NameList::into_names(front.expertise),
            body: body.to_owned(),
        })
    }
}

/// Split `content` into `(front_matter, body)` when it opens with a marker
/// line and a closing marker line follows.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix(FRONT_MATTER_MARKER)?.strip_prefix('\n')?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches('\n') == FRONT_MATTER_MARKER {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((block, body));
        }
        offset += line.len();
    }

    None
}

/// Whether `block` holds only blank lines and comments.
fn is_blank_yaml(block: &str) -> bool {
    block.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}
