//! Prompt templates for the pipeline stages.
//!
//! All templates are compiled once when the library is built (built-ins are
//! embedded in the binary, overrides are read from `prompts.templates_dir`)
//! and are immutable afterwards. Per-template custom text from the config is
//! appended to the rendered output.

pub mod template;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::config::PromptsConfig;
use crate::error::PipelineError;
use template::{Template, TemplateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    FitnessSystem,
    StyleSystem,
    StyleUser,
    CompetenciesSystem,
    CoverageSystem,
    SummarySystem,
    WriteSystem,
    DescribeSystem,
    DescribeUser,
}

impl TemplateId {
    pub const ALL: [TemplateId; 9] = [
        TemplateId::FitnessSystem,
        TemplateId::StyleSystem,
        TemplateId::StyleUser,
        TemplateId::CompetenciesSystem,
        TemplateId::CoverageSystem,
        TemplateId::SummarySystem,
        TemplateId::WriteSystem,
        TemplateId::DescribeSystem,
        TemplateId::DescribeUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateId::FitnessSystem => "fitness_system",
            TemplateId::StyleSystem => "style_system",
            TemplateId::StyleUser => "style_user",
            TemplateId::CompetenciesSystem => "competencies_system",
            TemplateId::CoverageSystem => "coverage_system",
            TemplateId::SummarySystem => "summary_system",
            TemplateId::WriteSystem => "write_system",
            TemplateId::DescribeSystem => "describe_system",
            TemplateId::DescribeUser => "describe_user",
        }
    }

    fn builtin_source(&self) -> &'static str {
        match self {
            TemplateId::FitnessSystem => include_str!("templates/fitness_system.md"),
            TemplateId::StyleSystem => include_str!("templates/style_system.md"),
            TemplateId::StyleUser => include_str!("templates/style_user.md"),
            TemplateId::CompetenciesSystem => include_str!("templates/competencies_system.md"),
            TemplateId::CoverageSystem => include_str!("templates/coverage_system.md"),
            TemplateId::SummarySystem => include_str!("templates/summary_system.md"),
            TemplateId::WriteSystem => include_str!("templates/write_system.md"),
            TemplateId::DescribeSystem => include_str!("templates/describe_system.md"),
            TemplateId::DescribeUser => include_str!("templates/describe_user.md"),
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown prompt template: {}", s))
    }
}

/// Compiled, read-only set of prompt templates.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<TemplateId, Template>,
    custom: HashMap<TemplateId, String>,
}

impl PromptLibrary {
    /// The templates shipped with the binary.
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::from_sources(std::iter::empty())
    }

    /// Built-ins with the given sources replacing their counterparts.
    pub fn from_sources<I>(overrides: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (TemplateId, String)>,
    {
        let mut sources: HashMap<TemplateId, String> = TemplateId::ALL
            .into_iter()
            .map(|id| (id, id.builtin_source().to_string()))
            .collect();
        sources.extend(overrides);

        let templates = sources
            .into_iter()
            .map(|(id, source)| Template::parse(id.as_str(), &source).map(|t| (id, t)))
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self {
            templates,
            custom: HashMap::new(),
        })
    }

    /// Build from config: `templates_dir/<id>.md` files override built-ins and
    /// `custom` entries are appended to the matching template's output.
    pub fn from_config(config: &PromptsConfig) -> Result<Self> {
        let mut overrides = Vec::new();
        if let Some(ref dir) = config.templates_dir {
            let dir = Path::new(dir);
            if !dir.is_dir() {
                bail!("Prompt templates directory not found: {}", dir.display());
            }
            for id in TemplateId::ALL {
                let path = dir.join(format!("{}.md", id.as_str()));
                if path.is_file() {
                    debug!("Loading prompt template {} from {}", id, path.display());
                    let source = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    overrides.push((id, source));
                }
            }
        }

        let mut library = Self::from_sources(overrides)?;
        for (key, text) in &config.custom {
            let id = TemplateId::from_str(key)?;
            library = library.with_custom(id, text.clone());
        }
        Ok(library)
    }

    pub fn with_custom(mut self, id: TemplateId, text: String) -> Self {
        self.custom.insert(id, text);
        self
    }

    pub fn render<T: Serialize + ?Sized>(
        &self,
        id: TemplateId,
        data: &T,
    ) -> Result<String, PipelineError> {
        let template = self.templates.get(&id).ok_or_else(|| TemplateError::Syntax {
            template: id.as_str().to_string(),
            line: 0,
            message: "template is not loaded".to_string(),
        })?;
        let mut text = template.render(data)?;
        if let Some(custom) = self.custom.get(&id) {
            text = format!("{}\n\n{}", text.trim_end(), custom);
        }
        Ok(text)
    }
}
