//! Agent prompt composition.
//!
//! Agent definitions are Markdown files with an optional front-matter block
//! naming the skills and expertise documents to inject ahead of the agent's
//! own instructions. Every file access goes through [`path_safety`] so a
//! definition can never pull content from outside its trusted root.

pub mod composer;
pub mod definition;
pub mod path_safety;

pub use composer::{ComposedPrompt, PromptComposer, PromptSection, SectionKind};
pub use definition::AgentDefinition;
pub use path_safety::resolve_within;
