use anyhow::Result;
use std::io::Write;

use super::Session;

/// Print the Markdown preflight analysis of one record.
pub async fn run<W: Write>(session: &Session, index: usize, out: &mut W) -> Result<()> {
    let record = session.skill(index)?;
    let analysis = session.pipeline.describe_skill(record).await?;
    writeln!(out, "{}", analysis.trim_end())?;
    Ok(())
}
