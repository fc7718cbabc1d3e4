pub mod config_check;
pub mod describe;
pub mod find;
pub mod interactive;
pub mod write;

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::llm::factory;
use crate::pipeline::Pipeline;
use crate::prompts::PromptLibrary;
use crate::skills::{load_skills, SkillRecord};

/// Options shared by every command that runs the pipeline.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub config_path: Option<String>,
    pub csv_path: String,
    pub dry_run: bool,
    pub classifier_model: Option<String>,
    pub writer_model: Option<String>,
    pub base_url: Option<String>,
    pub concurrency: Option<usize>,
}

/// Everything a command needs, loaded and validated before the first model call.
pub struct Session {
    pub config: Config,
    pub skills: Vec<SkillRecord>,
    pub pipeline: Pipeline,
}

impl Session {
    pub fn load(options: &SessionOptions) -> Result<Self> {
        let mut config = Config::load_with_path(options.config_path.clone())?;
        apply_overrides(&mut config, options);
        config.validate().context("Invalid configuration")?;

        let skills = load_skills(&options.csv_path, &config.skills)?;
        info!("Loaded {} skill records from {}", skills.len(), options.csv_path);

        let prompts = PromptLibrary::from_config(&config.prompts)?;
        let client = factory::create_client(&config, options.dry_run)?;
        let pipeline = Pipeline::from_config(client, &config, Arc::new(prompts));

        Ok(Self {
            config,
            skills,
            pipeline,
        })
    }

    /// Record by 0-based index, with a readable error when out of range.
    pub fn skill(&self, index: usize) -> Result<&SkillRecord> {
        match self.skills.get(index) {
            Some(record) => Ok(record),
            None => bail!(
                "Skill index {} out of range (0..{})",
                index,
                self.skills.len()
            ),
        }
    }
}

pub fn apply_overrides(config: &mut Config, options: &SessionOptions) {
    if let Some(ref model) = options.classifier_model {
        info!("CLI override: classifier model = {}", model);
        config.models.classifier = model.clone();
    }
    if let Some(ref model) = options.writer_model {
        info!("CLI override: writer model = {}", model);
        config.models.writer = model.clone();
    }
    if let Some(ref base_url) = options.base_url {
        info!("CLI override: base_url = {}", base_url);
        config.api.base_url = base_url.clone();
    }
    if let Some(concurrency) = options.concurrency {
        info!("CLI override: max_concurrency = {}", concurrency);
        config.pipeline.max_concurrency = concurrency;
    }
}

/// Parse a comma-separated list of 1-based choices out of `count` options
/// into 0-based positions, keeping the given order.
pub fn parse_selection(input: &str, count: usize) -> Result<Vec<usize>> {
    input
        .split(',')
        .map(|part| match part.trim().parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => Ok(n - 1),
            _ => bail!("invalid selection: {}", part.trim()),
        })
        .collect()
}
