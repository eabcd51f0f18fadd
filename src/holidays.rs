//! Holiday guard for scheduled commands
//!
//! `except-on` runs a command unless today is listed in a holidays file,
//! so timer-driven `display on`/`run` jobs can skip closed days.

use chrono::{Local, NaiveDate};
use color_eyre::eyre::{self, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d. %m. %Y", "%d.%m.%Y"];

/// Parse a date in any of the accepted formats
///
/// # Errors
/// Returns an error naming every tried format if none matches.
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    let mut failures = Vec::new();
    for format in DATE_FORMATS {
        match NaiveDate::parse_from_str(text, format) {
            Ok(date) => return Ok(date),
            Err(e) => failures.push(format!("{format}: {e}")),
        }
    }
    eyre::bail!(
        "Cannot parse \"{}\" with any of the formats {:?} ({})",
        text,
        DATE_FORMATS,
        failures.join("; ")
    )
}

/// Parse a holidays file: one date per line, `#` comments, blank lines ignored
///
/// # Errors
/// Returns an error for the first line that is not a date.
pub fn parse_holidays(contents: &str) -> Result<Vec<NaiveDate>> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(number, line)| {
            let entry = line.split('#').next().unwrap_or_default().trim();
            (!entry.is_empty()).then_some((number + 1, entry))
        })
        .map(|(number, entry)| parse_date(entry).with_context(|| format!("Line {number}")))
        .collect()
}

/// Read and parse a holidays file
///
/// # Errors
/// Returns an error if the file cannot be read or contains a bad line.
pub fn load_holidays(path: &Path) -> Result<Vec<NaiveDate>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read holidays file {path:?}"))?;
    parse_holidays(&contents).with_context(|| format!("Invalid holidays file {path:?}"))
}

/// Run `command` unless `today` is a holiday; returns its exit code
///
/// Skipping counts as success. A command killed by a signal yields 1.
///
/// # Errors
/// Returns an error if the command is empty or cannot be started.
pub fn run_except_on(holidays: &[NaiveDate], today: NaiveDate, command: &[String]) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        eyre::bail!("No command given");
    };

    if holidays.contains(&today) {
        info!("{} is a holiday, not running {}", today, program);
        return Ok(0);
    }

    debug!("Running {:?}", command);
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("Failed to run {program}"))?;
    Ok(status.code().unwrap_or(1))
}

/// `except-on` entry point: uses the local date
///
/// # Errors
/// Returns an error if the holidays file is invalid or the command cannot run.
pub fn except_on(holidays_file: Option<&Path>, command: &[String]) -> Result<i32> {
    let holidays = match holidays_file {
        Some(path) => load_holidays(path)?,
        None => Vec::new(),
    };
    run_except_on(&holidays, Local::now().date_naive(), command)
}
