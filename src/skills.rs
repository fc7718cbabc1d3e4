//! Skill records and the CSV catalogue they are loaded from.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::config::SkillsConfig;
use crate::util::normalize_text;

/// One row of the skills catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillRecord {
    pub category: String,
    pub competence: String,
    pub note: String,
}

impl SkillRecord {
    pub fn new(
        category: impl Into<String>,
        competence: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            competence: competence.into(),
            note: note.into(),
        }
    }

    /// The note flattened to a single normalized line.
    pub fn evidence_text(&self) -> String {
        normalize_text(&self.note)
    }
}

/// Load skill records in file order. Columns are addressed by header name.
pub fn load_skills<P: AsRef<Path>>(path: P, config: &SkillsConfig) -> Result<Vec<SkillRecord>> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(config.delimiter)?)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open skills file {}", path.display()))?;
    read_skills(reader, config).with_context(|| format!("Failed to read {}", path.display()))
}

/// Same as [`load_skills`] for in-memory CSV text.
pub fn parse_skills(data: &str, config: &SkillsConfig) -> Result<Vec<SkillRecord>> {
    let reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(config.delimiter)?)
        .flexible(true)
        .from_reader(data.as_bytes());
    read_skills(reader, config)
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    if !delimiter.is_ascii() {
        bail!("CSV delimiter must be a single ASCII character, got {:?}", delimiter);
    }
    Ok(delimiter as u8)
}

fn read_skills<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    config: &SkillsConfig,
) -> Result<Vec<SkillRecord>> {
    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
            .with_context(|| format!("Missing column '{}' in skills file", name))
    };
    let category = column(&config.category_column)?;
    let competence = column(&config.competence_column)?;
    let note = column(&config.note_column)?;

    let mut skills = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Invalid CSV row {}", row + 2))?;
        let field = |index: usize| record.get(index).unwrap_or_default().to_string();
        skills.push(SkillRecord {
            category: field(category),
            competence: field(competence),
            note: field(note),
        });
    }

    debug!("Parsed {} skill records", skills.len());
    Ok(skills)
}
