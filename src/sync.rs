//! Poster archive download
//!
//! Fetches the configured ZIP archive, extracts it over the page directory
//! and prunes whatever the archive no longer contains.

use color_eyre::eyre::{self, Context, ContextCompat, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::Config;

const ARCHIVE_NAME: &str = "archive-current.zip";
const REQUIRED_TOOLS: &[&str] = &["wget", "unzip"];

/// What pruning removed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub removed_files: Vec<PathBuf>,
    pub removed_dirs: Vec<PathBuf>,
}

/// Result of a complete download
#[derive(Debug)]
pub struct SyncReport {
    pub archive: PathBuf,
    pub extracted: usize,
    pub pruned: PruneReport,
}

/// Download, extract and prune
///
/// # Errors
/// Returns an error if `archive_url` is not configured, a required tool is
/// missing, or any step fails. Nothing is pruned unless extraction succeeded.
pub fn download(config: &Config) -> Result<SyncReport> {
    let url = config
        .kiosk
        .archive_url
        .as_deref()
        .context("No archive_url configured in [kiosk]")?;

    for tool in REQUIRED_TOOLS {
        which::which(tool).with_context(|| format!("Required tool '{tool}' not found in PATH"))?;
    }

    let cache = &config.kiosk.cache;
    let page_dir = &config.kiosk.page_directory;
    fs::create_dir_all(cache).with_context(|| format!("Failed to create cache directory {cache:?}"))?;
    fs::create_dir_all(page_dir).with_context(|| format!("Failed to create page directory {page_dir:?}"))?;

    let archive = cache.join(ARCHIVE_NAME);
    info!("Downloading {} to {:?}", url, archive);
    run_tool(Command::new("wget").arg(url).arg("-O").arg(&archive))?;

    let members = list_members(&archive)?;
    info!("Extracting {} entries to {:?}", members.len(), page_dir);
    run_tool(
        Command::new("unzip")
            .args(["-o", "-q"])
            .arg(&archive)
            .arg("-d")
            .arg(page_dir),
    )?;

    let keep = member_paths(page_dir, &members);
    let pruned = prune_stale(page_dir, &keep)?;

    Ok(SyncReport {
        archive,
        extracted: members.len(),
        pruned,
    })
}

/// Entry names of a ZIP archive
fn list_members(archive: &Path) -> Result<Vec<String>> {
    let stdout = run_tool(Command::new("unzip").arg("-Z1").arg(archive))?;
    Ok(parse_member_list(&stdout))
}

fn parse_member_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Paths below `root` that the archive members occupy
#[must_use]
pub fn member_paths(root: &Path, members: &[String]) -> HashSet<PathBuf> {
    members
        .iter()
        .map(|member| root.join(member.trim_end_matches('/')))
        .collect()
}

/// Remove files under `root` not in `keep`, then every empty directory
///
/// The walk is bottom-up, so a directory emptied by pruning is removed in
/// the same pass. Listed directories go too once empty; `root` itself
/// always stays.
///
/// # Errors
/// Returns an error if the tree cannot be walked or an entry cannot be removed.
pub fn prune_stale(root: &Path, keep: &HashSet<PathBuf>) -> Result<PruneReport> {
    let mut report = PruneReport::default();

    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry.with_context(|| format!("Failed to walk {root:?}"))?;
        let path = entry.path();

        if entry.file_type().is_dir() {
            let is_empty = fs::read_dir(path)
                .with_context(|| format!("Failed to read {path:?}"))?
                .next()
                .is_none();
            if is_empty {
                debug!("Removing empty directory {:?}", path);
                fs::remove_dir(path).with_context(|| format!("Failed to remove {path:?}"))?;
                report.removed_dirs.push(path.to_path_buf());
            }
        } else if !keep.contains(path) {
            debug!("Removing stale file {:?}", path);
            fs::remove_file(path).with_context(|| format!("Failed to remove {path:?}"))?;
            report.removed_files.push(path.to_path_buf());
        }
    }

    info!(
        "Pruned {} file(s) and {} directory(ies) from {:?}",
        report.removed_files.len(),
        report.removed_dirs.len(),
        root
    );
    Ok(report)
}

/// Run an external tool to completion, returning its stdout
fn run_tool(command: &mut Command) -> Result<String> {
    let program = command.get_program().to_string_lossy().into_owned();
    debug!("Running {:?}", command);

    let output = command
        .output()
        .with_context(|| format!("Failed to run {program}"))?;
    if !output.status.success() {
        eyre::bail!(
            "{} failed with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_member_list_parsing() {
        let members = parse_member_list("a.pdf\nsub/\nsub/b.mp4\n\n");
        assert_eq!(members, vec!["a.pdf", "sub/", "sub/b.mp4"]);

        let keep = member_paths(Path::new("/pages"), &members);
        assert!(keep.contains(Path::new("/pages/sub")));
        assert!(keep.contains(Path::new("/pages/sub/b.mp4")));
    }

    #[test]
    fn test_download_requires_archive_url() {
        let config = Config::default();
        let err = download(&config).unwrap_err();
        assert!(err.to_string().contains("archive_url"));
    }

    #[test]
    fn test_failing_tool_reports_stderr() {
        let err = run_tool(Command::new("sh").args(["-c", "echo broken >&2; exit 2"])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("broken"), "{message}");
    }

    #[test]
    fn test_prune_removes_empty_member_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let keep = member_paths(dir.path(), &["empty/".to_string()]);

        let report = prune_stale(dir.path(), &keep).unwrap();
        assert_eq!(report.removed_dirs, vec![dir.path().join("empty")]);
        assert!(report.removed_files.is_empty());
        assert!(!dir.path().join("empty").exists());
        assert!(dir.path().is_dir());
    }
}
