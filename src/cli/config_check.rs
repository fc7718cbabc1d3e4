use anyhow::Result;
use std::env;
use std::path::Path;

use crate::config::Config;
use crate::prompts::PromptLibrary;
use crate::skills::load_skills;

struct CheckResult {
    passed: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl CheckResult {
    fn new() -> Self {
        Self {
            passed: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn pass(&mut self, msg: impl Into<String>) {
        self.passed.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }
}

/// Check config, API key, prompt templates and the skills file without
/// calling a model.
pub fn run(config_path: Option<String>, csv_path: &str) -> Result<()> {
    let mut results = CheckResult::new();

    let config = match Config::load_with_path(config_path.clone()) {
        Ok(config) => {
            let source = config_path.as_deref().unwrap_or("default search path");
            results.pass(format!("Config loaded from {}", source));
            config
        }
        Err(e) => {
            // Reported through print_results, not propagated, so it prints once.
            results.error(format!("Failed to load config: {:#}", e));
            print_results(&results);
            anyhow::bail!("config could not be loaded");
        }
    };

    check_config(&config, csv_path, &mut results);
    print_results(&results);

    if !results.errors.is_empty() {
        anyhow::bail!("{} config error(s) found", results.errors.len());
    }
    Ok(())
}

fn check_config(config: &Config, csv_path: &str, results: &mut CheckResult) {
    match config.validate() {
        Ok(()) => results.pass(format!(
            "API: {} at {} (classifier: {}, writer: {})",
            config.api.provider, config.api.base_url, config.models.classifier, config.models.writer
        )),
        Err(e) => results.error(e.to_string()),
    }

    check_api_key(config, results);

    if config.api.max_retries > 0 {
        results.warn(format!(
            "Transport retries enabled: max_retries={} (backoff {}ms)",
            config.api.max_retries, config.api.retry_backoff_ms
        ));
    }

    results.pass(format!(
        "Pipeline: max_concurrency={}, parallel_stages={}, synthesis_inputs={:?}",
        config.pipeline.max_concurrency,
        config.pipeline.parallel_stages,
        config.pipeline.synthesis_inputs
    ));
    if config.pipeline.max_concurrency > 1 && is_local_base_url(&config.api.base_url) {
        results.warn(format!(
            "max_concurrency={} against a local server may queue requests",
            config.pipeline.max_concurrency
        ));
    }

    match PromptLibrary::from_config(&config.prompts) {
        Ok(_) => results.pass(match config.prompts.templates_dir {
            Some(ref dir) => format!("Prompt templates compiled (overrides from {})", dir),
            None => "Prompt templates compiled (built-in)".to_string(),
        }),
        Err(e) => results.error(format!("Prompt templates: {:#}", e)),
    }

    if Path::new(csv_path).is_file() {
        match load_skills(csv_path, &config.skills) {
            Ok(skills) if skills.is_empty() => {
                results.warn(format!("Skills file {} has no records", csv_path))
            }
            Ok(skills) => results.pass(format!("Skills file {}: {} records", csv_path, skills.len())),
            Err(e) => results.error(format!("Skills file: {:#}", e)),
        }
    } else {
        results.error(format!("Skills file not found: {}", csv_path));
    }
}

fn check_api_key(config: &Config, results: &mut CheckResult) {
    if config.api.provider == "mock" {
        results.pass("Mock provider: no API key needed");
        return;
    }
    let keyless_ok = config.api.provider == "openai-chat";
    match &config.api.api_key_env {
        Some(env_var) if env_var.to_lowercase() == "none" => {
            results.pass("No API key needed");
        }
        Some(env_var) => match env::var(env_var) {
            Ok(v) if !v.trim().is_empty() => {
                results.pass(format!("API key: {} is set", env_var));
            }
            _ if keyless_ok => {
                results.warn(format!(
                    "API key: {} is not set (OK for local servers)",
                    env_var
                ));
            }
            _ => {
                results.error(format!("API key: {} is not set", env_var));
            }
        },
        None => results.warn("No api_key_env configured; requests are sent without a key"),
    }
}

fn is_local_base_url(url: &str) -> bool {
    url.contains("localhost") || url.contains("127.0.0.1")
}

fn print_results(results: &CheckResult) {
    println!();
    for msg in &results.passed {
        println!("  \u{2713} {}", msg);
    }
    for msg in &results.warnings {
        println!("  ! {}", msg);
    }
    for msg in &results.errors {
        println!("  \u{2717} {}", msg);
    }
    println!();
    println!(
        "{} passed, {} warnings, {} errors",
        results.passed.len(),
        results.warnings.len(),
        results.errors.len()
    );
}
