use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Default, Parser)]
#[command(
    name = "pagefeed",
    version,
    about = "Rasterizes uploaded documents into labeling work items"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP intake server.
    Serve(ServeArgs),
    /// Process one batch of queue notifications and print the batch result.
    Process(ProcessArgs),
    /// Print the next free work-item sequence number of a bucket.
    NextSequence(NextSequenceArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs;

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Queue event JSON file, or `-` for stdin.
    #[arg(value_name = "EVENT_FILE", required_unless_present = "key")]
    pub input: Option<PathBuf>,
    /// Process a single object instead of an event file.
    #[arg(long, requires = "key", conflicts_with = "input")]
    pub bucket: Option<String>,
    /// Object key as a storage notification would carry it (URL-escaped).
    #[arg(long, requires = "bucket")]
    pub key: Option<String>,
}

#[derive(Debug, Args)]
pub struct NextSequenceArgs {
    /// Bucket whose `ingest/` namespace is scanned.
    #[arg(value_name = "BUCKET")]
    pub bucket: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_accepts_event_file() {
        let cli = Cli::try_parse_from(["pagefeed", "-vv", "process", "event.json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let Some(Commands::Process(args)) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(args.input, Some(PathBuf::from("event.json")));
        assert!(args.bucket.is_none());
    }

    #[test]
    fn process_accepts_bucket_and_key() {
        let cli = Cli::try_parse_from([
            "pagefeed",
            "process",
            "--bucket",
            "docs",
            "--key",
            "upload/a+b.pdf",
        ])
        .unwrap();
        let Some(Commands::Process(args)) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(args.bucket.as_deref(), Some("docs"));
        assert_eq!(args.key.as_deref(), Some("upload/a+b.pdf"));
    }

    #[test]
    fn process_requires_some_input() {
        assert!(Cli::try_parse_from(["pagefeed", "process"]).is_err());
        assert!(Cli::try_parse_from(["pagefeed", "process", "--bucket", "docs"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
