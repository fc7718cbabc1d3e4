use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::io;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use evidencer::cli::{self, Session, SessionOptions};

#[derive(Parser)]
#[command(name = "evidencer", version)]
#[command(about = "Write competency evidence from review text with an LLM pipeline", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Path to config file (defaults to ./evidencer.toml or ~/.config/evidencer/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Skills CSV file
    #[arg(long, global = true, default_value = "skills.csv")]
    csv: String,

    /// Verbose logging (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    /// Use the offline mock client instead of a real model
    #[arg(long, global = true)]
    dry_run: bool,

    /// Override the classifier model
    #[arg(long, global = true)]
    classifier_model: Option<String>,

    /// Override the writer model
    #[arg(long, global = true)]
    writer_model: Option<String>,

    /// Override the API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Override the number of concurrent classifier calls while scanning
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

impl GlobalArgs {
    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            config_path: self.config.clone(),
            csv_path: self.csv.clone(),
            dry_run: self.dry_run,
            classifier_model: self.classifier_model.clone(),
            writer_model: self.writer_model.clone(),
            base_url: self.base_url.clone(),
            concurrency: self.concurrency,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Enter a title and evidence, pick matching skills, and write evidence for them
    Interactive,

    /// List the skills that match a piece of text
    Find {
        /// Free text to classify against every skill
        #[arg(long)]
        text: String,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write evidence for one skill
    Write {
        /// 0-based row of the skill in the CSV file
        #[arg(long)]
        index: usize,

        /// Title of the review or feedback
        #[arg(long)]
        title: String,

        /// Review or feedback text to turn into evidence
        #[arg(long)]
        review: String,
    },

    /// Print the preflight analysis of one skill
    Describe {
        /// 0-based row of the skill in the CSV file
        #[arg(long)]
        index: usize,
    },

    /// Check config, API key, prompt templates and skills file
    ConfigCheck,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.debug);

    if let Commands::ConfigCheck = cli.command {
        return cli::config_check::run(cli.global.config.clone(), &cli.global.csv);
    }

    let session = Session::load(&cli.global.session_options())?;

    let cancel = session.pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling model calls");
            cancel.cancel();
        }
    });

    let mut stdout = io::stdout();
    match cli.command {
        Commands::Interactive => cli::interactive::run(&session).await?,
        Commands::Find { text, json } => cli::find::run(&session, &text, json, &mut stdout).await?,
        Commands::Write {
            index,
            title,
            review,
        } => cli::write::run(&session, index, &title, &review, &mut stdout).await?,
        Commands::Describe { index } => cli::describe::run(&session, index, &mut stdout).await?,
        Commands::ConfigCheck => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_interactive_defaults() {
        let cli = Cli::try_parse_from(["evidencer", "interactive"]).unwrap();
        assert!(matches!(cli.command, Commands::Interactive));
        assert_eq!(cli.global.csv, "skills.csv");
        assert!(!cli.global.debug);
        assert!(!cli.global.dry_run);
        assert!(cli.global.config.is_none());
    }

    #[test]
    fn test_parse_find_with_global_flags() {
        let cli = Cli::try_parse_from([
            "evidencer",
            "find",
            "--text",
            "I designed a REST API",
            "--json",
            "--csv",
            "my.csv",
            "--dry-run",
            "--concurrency",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Find { text, json } => {
                assert_eq!(text, "I designed a REST API");
                assert!(json);
            }
            _ => panic!("expected find"),
        }
        let options = cli.global.session_options();
        assert_eq!(options.csv_path, "my.csv");
        assert!(options.dry_run);
        assert_eq!(options.concurrency, Some(4));
    }

    #[test]
    fn test_parse_write() {
        let cli = Cli::try_parse_from([
            "evidencer",
            "--writer-model",
            "gpt-4.1",
            "write",
            "--index",
            "2",
            "--title",
            "Q3",
            "--review",
            "Great work",
        ])
        .unwrap();
        match cli.command {
            Commands::Write {
                index,
                title,
                review,
            } => {
                assert_eq!(index, 2);
                assert_eq!(title, "Q3");
                assert_eq!(review, "Great work");
            }
            _ => panic!("expected write"),
        }
        assert_eq!(cli.global.writer_model.as_deref(), Some("gpt-4.1"));
    }

    #[test]
    fn test_parse_describe_requires_index() {
        assert!(Cli::try_parse_from(["evidencer", "describe"]).is_err());
        let cli = Cli::try_parse_from(["evidencer", "describe", "--index", "0"]).unwrap();
        assert!(matches!(cli.command, Commands::Describe { index: 0 }));
    }

    #[test]
    fn test_parse_config_check() {
        let cli = Cli::try_parse_from(["evidencer", "config-check", "--config", "x.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::ConfigCheck));
        assert_eq!(cli.global.config.as_deref(), Some("x.toml"));
    }

    #[test]
    fn test_parse_missing_subcommand() {
        assert!(Cli::try_parse_from(["evidencer"]).is_err());
    }

    #[test]
    fn test_parse_unknown_subcommand() {
        assert!(Cli::try_parse_from(["evidencer", "foobar"]).is_err());
    }
}
