//! Prompt composition over a temporary `.claude` tree.

use std::path::Path;

use agent_pool::models::agent::AgentName;
use agent_pool::prompt::{PromptComposer, SectionKind};
use agent_pool::AppError;

fn tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for sub in ["agents", "skills", "expertise"] {
        std::fs::create_dir_all(dir.path().join(".claude").join(sub)).unwrap();
    }
    dir
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(".claude").join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn composer(root: &Path) -> PromptComposer {
    PromptComposer::new(
        root.join(".claude/agents").canonicalize().unwrap(),
        root.join(".claude/skills"),
        root.join(".claude/expertise"),
        "DEFINITION.md".into(),
        root.to_path_buf(),
    )
}

fn agent(name: &str) -> AgentName {
    AgentName::parse(name).unwrap()
}

#[tokio::test]
async fn sections_follow_environment_skills_expertise_body() {
    let dir = tree();
    write(
        dir.path(),
        "agents/reviewer.md",
        "---\nskills: [git, style]\nexpertise: [security]\n---\nReview it.",
    );
    write(dir.path(), "skills/git/DEFINITION.md", "Use git.\n");
    write(dir.path(), "skills/style/DEFINITION.md", "Keep style.");
    write(dir.path(), "expertise/security.md", "Think like an attacker.");

    let prompt = composer(dir.path()).compose(&agent("reviewer")).await.unwrap();
    let kinds: Vec<SectionKind> = prompt.sections().iter().map(|s| s.kind.clone()).collect();

    assert_eq!(
        kinds,
        vec![
            SectionKind::Environment,
            SectionKind::Skill("git".into()),
            SectionKind::Skill("style".into()),
            SectionKind::Expertise("security".into()),
            SectionKind::Body,
        ]
    );
    assert_eq!(prompt.sections()[1].text, "# Skill: git\nUse git.\n");
    assert_eq!(
        prompt.sections()[3].text,
        "# Expertise: security\nThink like an attacker."
    );
    assert!(prompt.render().ends_with("\n\nReview it."));
}

#[tokio::test]
async fn resource_contents_are_inserted_unchanged() {
    let dir = tree();
    write(dir.path(), "agents/coder.md", "---\nskills: [git]\n---\nCode.");
    write(dir.path(), "skills/git/DEFINITION.md", "Use git.\n\n");

    let prompt = composer(dir.path()).compose(&agent("coder")).await.unwrap();

    assert_eq!(prompt.sections()[1].text, "# Skill: git\nUse git.\n\n");
    assert!(
        prompt.render().contains("# Skill: git\nUse git.\n\n\n\nCode."),
        "{}",
        prompt.render()
    );
}

#[tokio::test]
async fn environment_header_names_the_working_directory() {
    let dir = tree();
    write(dir.path(), "agents/coder.md", "Code.");

    let prompt = composer(dir.path()).compose(&agent("coder")).await.unwrap();
    let header = &prompt.sections()[0].text;

    assert!(header.starts_with("# Environment\n"), "{header}");
    assert!(
        header.contains(&format!("Working directory: {}", dir.path().display())),
        "{header}"
    );
    assert!(header.contains("Date: "), "{header}");
}

#[tokio::test]
async fn body_is_kept_verbatim_and_last() {
    let dir = tree();
    let body = "Line one\n\n  indented\n---\n";
    write(dir.path(), "agents/coder.md", &format!("---\nskills: []\n---\n{body}"));

    let prompt = composer(dir.path()).compose(&agent("coder")).await.unwrap();

    assert_eq!(prompt.body(), body);
    assert_eq!(prompt.sections().last().unwrap().kind, SectionKind::Body);
    assert!(prompt.render().ends_with(body));
}

#[tokio::test]
async fn missing_skill_and_expertise_are_skipped() {
    let dir = tree();
    write(
        dir.path(),
        "agents/coder.md",
        "---\nskills: [absent, present]\nexpertise: [nowhere]\n---\nCode.",
    );
    write(dir.path(), "skills/present/DEFINITION.md", "Here.");

    let prompt = composer(dir.path()).compose(&agent("coder")).await.unwrap();
    let kinds: Vec<SectionKind> = prompt.sections().iter().map(|s| s.kind.clone()).collect();

    assert_eq!(
        kinds,
        vec![
            SectionKind::Environment,
            SectionKind::Skill("present".into()),
            SectionKind::Body,
        ]
    );
}

#[tokio::test]
async fn missing_skill_root_is_skipped() {
    let dir = tree();
    write(dir.path(), "agents/coder.md", "---\nskills: [git]\n---\nCode.");
    std::fs::remove_dir_all(dir.path().join(".claude/skills")).unwrap();

    let prompt = composer(dir.path()).compose(&agent("coder")).await.unwrap();
    assert_eq!(prompt.sections().len(), 2);
}

#[tokio::test]
async fn missing_definition_is_not_found() {
    let dir = tree();

    let err = composer(dir.path()).compose(&agent("ghost")).await.unwrap_err();
    assert!(matches!(err, AppError::DefinitionNotFound(_)), "{err}");
}

#[tokio::test]
async fn traversal_in_skill_reference_is_rejected() {
    let dir = tree();
    write(dir.path(), "agents/coder.md", "---\nskills: [../../agents/coder]\n---\nCode.");

    let err = composer(dir.path()).compose(&agent("coder")).await.unwrap_err();
    assert!(matches!(err, AppError::PathTraversal(_)), "{err}");
}

#[tokio::test]
async fn traversal_in_expertise_reference_is_rejected() {
    let dir = tree();
    write(dir.path(), "agents/coder.md", "---\nexpertise: [.hidden]\n---\nCode.");

    let err = composer(dir.path()).compose(&agent("coder")).await.unwrap_err();
    assert!(matches!(err, AppError::PathTraversal(_)), "{err}");
}

#[tokio::test]
async fn each_compose_reads_the_definition_fresh() {
    let dir = tree();
    write(dir.path(), "agents/coder.md", "First.");
    let composer = composer(dir.path());
    assert_eq!(composer.compose(&agent("coder")).await.unwrap().body(), "First.");

    write(dir.path(), "agents/coder.md", "Second.");
    assert_eq!(composer.compose(&agent("coder")).await.unwrap().body(), "Second.");
}

#[tokio::test]
async fn malformed_front_matter_is_an_invalid_definition() {
    let dir = tree();
    write(dir.path(), "agents/coder.md", "---\nskills: [git\n---\nCode.");

    let err = composer(dir.path()).compose(&agent("coder")).await.unwrap_err();
    let AppError::InvalidDefinition(msg) = err else {
        panic!("expected invalid definition, got {err:?}");
    };
    assert!(msg.contains("coder.md"), "{msg}");
}
