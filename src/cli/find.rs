use anyhow::Result;
use std::io::Write;

use super::Session;

/// Print the records that match `text`, one per line, or as JSON.
pub async fn run<W: Write>(session: &Session, text: &str, json: bool, out: &mut W) -> Result<()> {
    let matches = session
        .pipeline
        .find_fitting_skills(&session.skills, text)
        .await?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&matches)?)?;
        return Ok(());
    }

    if matches.is_empty() {
        writeln!(out, "No skills matched.")?;
        return Ok(());
    }
    for m in &matches {
        let record = session.skill(m.skill_index)?;
        writeln!(
            out,
            "{}\t{}\t{} / {}",
            m.skill_index, m.fitness, record.category, record.competence
        )?;
    }
    Ok(())
}
