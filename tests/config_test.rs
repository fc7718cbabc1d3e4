//! Configuration loading and the skills file it describes

use anyhow::Result;
use evidencer::config::{Config, SynthesisInput};
use evidencer::skills::load_skills;
use std::fs;

#[test]
fn test_config_has_defaults() -> Result<()> {
    let config = Config::default();

    assert_eq!(config.api.timeout_secs, 120);
    assert_eq!(config.api.max_retries, 0, "retries are off by default");
    assert!(!config.models.classifier.is_empty());
    assert!(!config.models.writer.is_empty());
    config.validate()?;

    Ok(())
}

#[test]
fn test_full_config_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("evidencer.toml");
    fs::write(
        &path,
        r#"
[api]
provider = "openai-chat"
base_url = "http://localhost:11434/v1"
api_key_env = "none"
temperature = 0.2
max_output_tokens = 800
timeout_secs = 30
max_retries = 2
retry_backoff_ms = 250

[models]
classifier = "llama3.1:8b"
writer = "llama3.1:70b"

[pipeline]
max_concurrency = 2
parallel_stages = true
synthesis_inputs = ["coverage", "competencies"]

[prompts]
custom = { write_system = "Answer in German." }

[skills]
category_column = "category"
competence_column = "competence"
note_column = "note"
delimiter = ";"
"#,
    )?;

    let config = Config::load_with_path(Some(path.to_string_lossy().to_string()))?;
    config.validate()?;

    assert_eq!(config.api.provider, "openai-chat");
    assert_eq!(config.api.temperature, Some(0.2));
    assert_eq!(config.api.max_output_tokens, Some(800));
    assert_eq!(config.api.max_retries, 2);
    assert_eq!(config.api.retry_backoff_ms, 250);
    assert_eq!(config.models.writer, "llama3.1:70b");
    assert_eq!(
        config.pipeline.synthesis_inputs,
        vec![SynthesisInput::Coverage, SynthesisInput::Competencies]
    );
    assert_eq!(
        config.prompts.custom.get("write_system").map(String::as_str),
        Some("Answer in German.")
    );
    assert_eq!(config.skills.delimiter, ';');
    assert_eq!(config.get_api_key()?, "");

    Ok(())
}

#[test]
fn test_unknown_synthesis_input_rejected() {
    let result: Result<Config, _> = toml::from_str(
        r#"
[api]
base_url = "http://x"
[models]
classifier = "a"
writer = "b"
[pipeline]
synthesis_inputs = ["style"]
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_skills_file_with_configured_columns() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let csv = dir.path().join("skills.csv");
    fs::write(
        &csv,
        "category;competence;note\nDev;API design;\"Built a REST API.\n\nIn Go.\"\nOps;Monitoring;\n",
    )?;

    let mut config = Config::default();
    config.skills.category_column = "category".to_string();
    config.skills.competence_column = "competence".to_string();
    config.skills.note_column = "note".to_string();
    config.skills.delimiter = ';';

    let skills = load_skills(&csv, &config.skills)?;
    assert_eq!(skills.len(), 2);
    assert_eq!(skills[0].evidence_text(), "Built a REST API. In Go.");
    assert_eq!(skills[1].competence, "Monitoring");
    assert_eq!(skills[1].evidence_text(), "");

    Ok(())
}

#[test]
fn test_skills_file_missing_column() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let csv = dir.path().join("skills.csv");
    fs::write(&csv, "Kompetenzkategorie,Kompetenz\nDev,API\n")?;

    let err = load_skills(&csv, &Config::default().skills).unwrap_err();
    assert!(format!("{:#}", err).contains("Missing column 'Bemerkung'"));

    Ok(())
}
