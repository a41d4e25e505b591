//! Composed system prompt for a worker process.
//!
//! The composed prompt is built fresh on every spawn. Its section order is
//! fixed: environment header, skills, expertise, then the agent's own body,
//! so the agent's instructions always come last.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::models::agent::{validate_component, AgentName};
use crate::prompt::definition::AgentDefinition;
use crate::prompt::path_safety::resolve_within;
use crate::{AppError, Result};

/// Separator placed between rendered sections (one blank line).
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Role of a section within the composed prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    /// Working directory and timestamp header.
    Environment,
    /// Injected skill document.
    Skill(String),
    /// Injected expertise document.
    Expertise(String),
    /// The agent definition's own body.
    Body,
}

/// One block of text within a [`ComposedPrompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSection {
    /// What the section holds.
    pub kind: SectionKind,
    /// Section text as it appears in the rendered prompt.
    pub text: String,
}

/// Ordered, immutable initialization payload for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    sections: Vec<PromptSection>,
}

impl ComposedPrompt {
    /// All sections in render order.
    #[must_use]
    pub fn sections(&self) -> &[PromptSection] {
        &self.sections
    }

    /// The agent's own body, exactly as written in its definition.
    #[must_use]
    pub fn body(&self) -> &str {
        self.sections
            .iter()
            .rev()
            .find(|section| section.kind == SectionKind::Body)
            .map_or("", |section| section.text.as_str())
    }

    /// Join all sections with a blank line between them.
    #[must_use]
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|section| section.text.as_str())
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }
}

/// Builds [`ComposedPrompt`]s from the trusted agents, skills and expertise roots.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    agents_dir: PathBuf,
    skills_dir: PathBuf,
    expertise_dir: PathBuf,
    skill_file: String,
    working_dir: PathBuf,
}

impl PromptComposer {
    /// Create a composer over explicit roots.
    #[must_use]
    pub fn new(
        agents_dir: PathBuf,
        skills_dir: PathBuf,
        expertise_dir: PathBuf,
        skill_file: String,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            agents_dir,
            skills_dir,
            expertise_dir,
            skill_file,
            working_dir,
        }
    }

    /// Create a composer from validated pool configuration.
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(
            config.agents_dir.clone(),
            config.skills_dir.clone(),
            config.expertise_dir.clone(),
            config.skill_file.clone(),
            config.working_dir().to_path_buf(),
        )
    }

    /// Load and parse the definition for `agent` without composing.
    ///
    /// # Errors
    ///
    /// - `AppError::PathTraversal` if the definition path escapes the agents root.
    /// - `AppError::DefinitionNotFound` if the file does not exist.
    /// - `AppError::InvalidDefinition` if its front matter is not valid YAML.
    /// - `AppError::Io` if the file exists but cannot be read.
    pub async fn load_definition(&self, agent: &AgentName) -> Result<AgentDefinition> {
        let path = resolve_within(&self.agents_dir, agent.definition_file())?;

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => AgentDefinition::parse(&content).map_err(|err| {
                AppError::InvalidDefinition(format!("{}: {err}", path.display()))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(AppError::DefinitionNotFound(path.display().to_string()))
            }
            Err(err) => Err(AppError::Io(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    /// Compose the full prompt for `agent`.
    ///
    /// Missing skill or expertise documents are logged and skipped.
    ///
    /// # Errors
    ///
    /// - `AppError::DefinitionNotFound` if the agent has no definition file.
    /// - `AppError::InvalidDefinition` if its front matter is malformed.
    /// - `AppError::PathTraversal` if the agent or any referenced name would
    ///   resolve outside its root.
    /// - `AppError::Io` if an existing file cannot be read.
    pub async fn compose(&self, agent: &AgentName) -> Result<ComposedPrompt> {
        let definition = self.load_definition(agent).await?;

        let mut sections = vec![PromptSection {
            kind: SectionKind::Environment,
            text: self.environment_header(),
        }];

        for skill in &definition.skills {
            validate_component(skill, "skill")?;
            let relative = Path::new(skill).join(&self.skill_file);
            if let Some(content) = load_optional(&self.skills_dir, &relative, "skill").await? {
                sections.push(PromptSection {
                    kind: SectionKind::Skill(skill.clone()),
                    text: format!("# Skill: {skill}\n{content}"),
                });
            }
        }

        for expertise in &definition.expertise {
            validate_component(expertise, "expertise")?;
            let relative = format!("{expertise}.md");
            if let Some(content) =
                load_optional(&self.expertise_dir, Path::new(&relative), "expertise").await?
            {
                sections.push(PromptSection {
                    kind: SectionKind::Expertise(expertise.clone()),
                    text: format!("# Expertise: {expertise}\n{content}"),
                });
            }
        }

        sections.push(PromptSection {
            kind: SectionKind::Body,
            text: definition.body,
        });

        debug!(
            agent = %agent,
            sections = sections.len(),
            "composed agent prompt"
        );

        Ok(ComposedPrompt { sections })
    }

    fn environment_header(&self) -> String {
        format!(
            "# Environment\nWorking directory: {}\nDate: {}\n---",
            self.working_dir.display(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// Read `relative` under `root`, returning `None` when it (or the root) is missing.
async fn load_optional(root: &Path, relative: &Path, kind: &str) -> Result<Option<String>> {
    let path = match resolve_within(root, relative) {
        Ok(path) => path,
        Err(AppError::Config(msg)) => {
            warn!(kind, path = %relative.display(), %msg, "resource root unavailable, skipping");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(kind, path = %path.display(), "resource not found, skipping");
            Ok(None)
        }
        Err(err) => Err(AppError::Io(format!(
            "failed to read {}: {err}",
            path.display()
        ))),
    }
}
