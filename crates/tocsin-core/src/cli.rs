use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::Filter;
use crate::task::Priority;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tocsin",
    version,
    about = "Task list with due-date reminders",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        global = true,
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Path to an alternate rc file
    #[arg(long = "tocsinrc", global = true)]
    pub tocsinrc: Option<PathBuf>,

    /// Path to an alternate data directory
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a new task
    Add {
        /// Task text; words are joined with spaces
        #[arg(required = true)]
        text: Vec<String>,

        #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
        priority: Option<Priority>,

        /// Due date in any accepted form (e.g. 2026-4-5, 5/4/2026, 5-4-2026, 17)
        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List tasks through a view filter
    List {
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Filter>()))]
        filter: Option<Filter>,
    },

    /// Edit fields of an existing task
    Edit {
        id: u64,

        #[arg(long)]
        text: Option<String>,

        #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
        priority: Option<Priority>,

        /// New due date; an empty string clears it
        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Toggle a task between active and completed
    Done { id: u64 },

    /// Delete a task
    Delete { id: u64 },

    /// Remove every completed task
    Clear,

    /// Stay in the foreground and fire due reminders as they come up
    Watch,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Command, GlobalCli, KeyVal};
    use crate::task::Priority;

    #[test]
    fn keyval_splits_on_first_equals() {
        let kv: KeyVal = "rc.color=off".parse().expect("parse");
        assert_eq!(kv.key, "rc.color");
        assert_eq!(kv.value, "off");
        assert!("no-equals".parse::<KeyVal>().is_err());
    }

    #[test]
    fn add_collects_words_and_flags() {
        let cli = GlobalCli::parse_from([
            "tocsin", "add", "buy", "milk", "--priority", "high", "--due", "5/4/2026",
        ]);
        match cli.command {
            Some(Command::Add {
                text,
                priority,
                due,
                notes,
            }) => {
                assert_eq!(text.join(" "), "buy milk");
                assert_eq!(priority, Some(Priority::High));
                assert_eq!(due.as_deref(), Some("5/4/2026"));
                assert_eq!(notes, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn bare_invocation_has_no_subcommand() {
        let cli = GlobalCli::parse_from(["tocsin"]);
        assert!(cli.command.is_none());
    }
}
