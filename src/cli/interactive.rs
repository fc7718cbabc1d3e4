use anyhow::{bail, Result};
use std::io::{self, BufRead, Write};
use tracing::info;

use super::{parse_selection, Session};

/// Ask for a title and evidence text, list the matching skills, and write
/// evidence for the ones the user picks.
pub async fn run(session: &Session) -> Result<()> {
    let mut input = io::stdin().lock();
    let mut output = io::stdout();
    run_with_io(session, &mut input, &mut output).await
}

pub async fn run_with_io<R: BufRead, W: Write>(
    session: &Session,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let title = prompt(input, out, "Feedback title: ")?;
    let evidence = prompt(input, out, "Evidence: ")?;
    let text = format!("{}\n{}", title, evidence);

    info!(title = %title, "Finding fitting skills");
    let matches = session
        .pipeline
        .find_fitting_skills(&session.skills, &text)
        .await?;

    if matches.is_empty() {
        writeln!(out, "\nNo skills matched.")?;
        return Ok(());
    }

    writeln!(out, "\n{} skill(s) matched:", matches.len())?;
    for (i, m) in matches.iter().enumerate() {
        let record = session.skill(m.skill_index)?;
        writeln!(out, "  {}) [{}] {}", i + 1, m.fitness, record.competence)?;
    }

    let selection = prompt(
        input,
        out,
        "\nSelect skills (comma-separated numbers, e.g. 1,3): ",
    )?;
    let chosen = parse_selection(&selection, matches.len())?;

    for position in chosen {
        let record = session.skill(matches[position].skill_index)?;
        writeln!(out, "\n--- {} ---", record.competence)?;
        let draft = session
            .pipeline
            .generate_evidence(record, &title, &text)
            .await?;
        writeln!(out, "\n{}", draft.evidence)?;
    }

    Ok(())
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, label: &str) -> Result<String> {
    write!(out, "{}", label)?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("Unexpected end of input");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
