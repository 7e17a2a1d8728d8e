//! Dump decoding command.

use {
    crate::Cli,
    anyhow::{Context, Result},
    console::style,
    mnemo::{
        Survey, decode_surveys,
        survey::{ShotType, decode::load_dump},
    },
    std::{fs, path::Path},
};

/// One summary line for a survey.
fn summary_line(index: usize, survey: &Survey) -> String {
    let legs = survey
        .shots
        .iter()
        .filter(|s| s.shot_type == ShotType::Std)
        .count();
    format!(
        "[{index:2}] {:<3}  {}  {:<3}  {legs:3} legs  {:8.2} m{}",
        survey.name,
        survey.date.format("%Y-%m-%d %H:%M"),
        survey.direction.to_string(),
        survey.total_length(),
        if survey.is_complete() {
            ""
        } else {
            "  (incomplete)"
        }
    )
}

/// Decode command implementation.
pub(crate) fn cmd_decode(cli: &Cli, file: &Path, json: bool) -> Result<()> {
    let contents =
        fs::read(file).with_context(|| format!("Failed to read dump {}", file.display()))?;
    let data =
        load_dump(&contents).with_context(|| format!("Failed to parse dump {}", file.display()))?;
    let decoded = decode_surveys(&data);

    if let Some(issue) = &decoded.issue {
        eprintln!("{} Decoding stopped: {issue}", style("⚠").yellow());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&decoded.surveys)?);
        return Ok(());
    }

    if cli.quiet {
        return Ok(());
    }

    eprintln!(
        "{}",
        style(format!(
            "{} surveys in {} ({} bytes)",
            decoded.surveys.len(),
            file.display(),
            data.len()
        ))
        .bold()
        .underlined()
    );
    for (i, survey) in decoded.surveys.iter().enumerate() {
        eprintln!("  {}", summary_line(i, survey));
    }

    Ok(())
}
