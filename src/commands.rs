//! CLI commands
//!
//! One-shot commands that do not start the kiosk: listing, validation,
//! archive download, screen power and the holiday guard.

use color_eyre::eyre::Result;
use crossterm::style::Stylize;
use std::path::Path;

use crate::config::{Config, runtime_dir};
use crate::display::{self, Power};
use crate::holidays;
use crate::pidfile;
use crate::poster;
use crate::style::KioskStyle;
use crate::sync;

/// Print discovered posters without launching anything
///
/// # Errors
/// Returns an error if the page directory cannot be read.
pub fn list(config: &Config) -> Result<()> {
    let page_dir = &config.kiosk.page_directory;
    let posters = poster::discover(page_dir, &config.viewers.mime_query, &runtime_dir())?;

    println!("{}", "POSTERS:".header());
    println!("{}", "-".repeat(8));
    if posters.is_empty() {
        println!("  {}", "(none)".dim());
    }
    for p in &posters {
        println!(
            "  {:>3}  {:<8}  {}",
            p.index().to_string().bold(),
            p.kind().to_string().technical(),
            p.filepath().display()
        );
    }

    println!("\n{} {}", "Directory:".dim(), page_dir.display());
    Ok(())
}

/// Check the config and print its summary
pub fn validate(config: &Config, path: Option<&Path>) {
    config.print_summary();
    match path.map(Path::to_path_buf).or_else(|| Config::get_config_path().ok()) {
        Some(path) if path.exists() => println!("\n{} {}", "Config:".dim(), path.display()),
        Some(path) => println!("\n{} {} {}", "Config:".dim(), path.display(), "(not found, defaults)".warning()),
        None => {}
    }
}

/// Fetch the archive and sync the page directory
///
/// # Errors
/// Returns an error if the download, extraction or pruning fails.
pub fn download(config: &Config) -> Result<()> {
    let report = sync::download(config)?;

    println!("{} {}", "✓ Downloaded".success(), report.archive.display());
    println!(
        "  {} entries extracted to {}",
        report.extracted.to_string().technical(),
        config.kiosk.page_directory.display()
    );
    for file in &report.pruned.removed_files {
        println!("  {} {}", "- rm".warning(), file.display());
    }
    for dir in &report.pruned.removed_dirs {
        println!("  {} {}/", "- rmdir".warning(), dir.display());
    }
    Ok(())
}

/// Switch the screen and pause or resume the running kiosk
///
/// # Errors
/// Returns an error if the screen cannot be switched.
pub fn display(power: Power) -> Result<()> {
    display::set_power(power, &pidfile::default_path())
}

/// Run a command unless today is a holiday; returns the exit code
///
/// # Errors
/// Returns an error if the holidays file is invalid or the command cannot start.
pub fn except_on(holidays_file: Option<&Path>, command: &[String]) -> Result<i32> {
    holidays::except_on(holidays_file, command)
}
