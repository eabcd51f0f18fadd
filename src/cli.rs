//! Command-line interface definitions
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Overrides;
use crate::display::Power;

/// posterwall - rotate posters across Wayfire workspaces
#[derive(Parser)]
#[command(name = "posterwall")]
#[command(version)]
#[command(about = "Poster kiosk - show documents and videos on a rotating set of Wayfire workspaces")]
#[command(after_help = "\
BEHAVIOR:
  - Every file in the page directory gets its own workspace, in name order
  - PDFs open in the document viewer, videos in a paused, looping player
  - Windows are moved to their workspace as soon as they appear
  - Once all are placed, workspaces rotate every auto-page-switch seconds
  - A video stays on screen for its own length and is rewound when hidden

COMMANDS:
  posterwall run                  Start the kiosk (needs WAYFIRE_SOCKET)
  posterwall download             Fetch and unpack the poster archive
  posterwall list                 Show discovered posters without launching
  posterwall validate             Check and summarize the config file
  posterwall display on|off       Switch the screen via HDMI-CEC
  posterwall except-on --holidays FILE -- CMD...
                                  Run CMD unless today is a holiday

SIGNALS:
  SIGTERM, SIGINT   Stop all viewers and exit
  SIGUSR1, SIGUSR2  Pause / resume the poster on screen

PID FILE:
  $XDG_RUNTIME_DIR/posterwall.pid (or /tmp/posterwall-$UID.pid)")]
pub struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/posterwall/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seconds between workspace switches; 0 or negative disables rotation
    #[arg(long, global = true, value_name = "SECS", allow_negative_numbers = true)]
    pub auto_page_switch: Option<f64>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            auto_page_switch: self.auto_page_switch,
        }
    }
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Launch all posters and rotate them until stopped
    Run,

    /// Download the poster archive and sync the page directory
    Download,

    /// List posters found in the page directory
    List,

    /// Validate config file and print a summary
    Validate,

    /// Switch the screen on or off and pause/resume the running kiosk
    Display {
        #[arg(value_enum)]
        power: Power,
    },

    /// Run a command unless today is listed as a holiday
    ExceptOn {
        /// File with one date per line (YYYY-MM-DD, DD.MM.YYYY or DD. MM. YYYY)
        #[arg(long, value_name = "FILE")]
        holidays: Option<PathBuf>,

        /// The command and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args = Args::try_parse_from(["posterwall", "run", "--auto-page-switch", "12.5", "-c", "/etc/p.toml"]).unwrap();
        assert!(matches!(args.command, Command::Run));
        assert_eq!(args.overrides().auto_page_switch, Some(12.5));
        assert_eq!(args.config, Some(PathBuf::from("/etc/p.toml")));
    }

    #[test]
    fn test_except_on_keeps_command_flags() {
        let args = Args::try_parse_from([
            "posterwall", "except-on", "--holidays", "h.txt", "--", "posterwall", "display", "on", "-v",
        ])
        .unwrap();
        let Command::ExceptOn { holidays, command } = args.command else {
            panic!("expected except-on");
        };
        assert_eq!(holidays, Some(PathBuf::from("h.txt")));
        assert_eq!(command, vec!["posterwall", "display", "on", "-v"]);
    }

    #[test]
    fn test_display_requires_state() {
        assert!(Args::try_parse_from(["posterwall", "display"]).is_err());
        assert!(Args::try_parse_from(["posterwall", "display", "dim"]).is_err());
    }
}
