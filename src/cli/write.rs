use anyhow::{Context, Result};
use std::io::Write;
use tracing::info;

use super::Session;

/// Generate evidence for the record at `index` (0-based) and print it.
pub async fn run<W: Write>(
    session: &Session,
    index: usize,
    title: &str,
    review: &str,
    out: &mut W,
) -> Result<()> {
    let record = session.skill(index)?;
    info!("Writing evidence for {} / {}", record.category, record.competence);

    let draft = session
        .pipeline
        .generate_evidence(record, title, review)
        .await
        .with_context(|| format!("Failed to generate evidence for '{}'", record.competence))?;

    writeln!(out, "{}", draft.evidence)?;
    Ok(())
}
