//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Errors only on stderr

use clap::{Args, Parser, Subcommand};

/// blockscope - Inspect block metadata stored in object storage
#[derive(Parser, Debug)]
#[command(name = "blockscope")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect metric data in an object storage bucket
    #[command(
        name = "bucket",
        long_about = "Inspect metric data in an object storage bucket.\n\n\
            Bucket flags select and authenticate the bucket and must come before \
            the subcommand. Defaults for the provider, endpoint, token and timeout \
            can be set in the configuration file.",
        after_help = "\
WORKFLOW EXAMPLES:
    # List block names in a GCS bucket
    blockscope bucket --bucket my-blocks ls

    # Print every block's metadata as JSON
    blockscope bucket --bucket my-blocks ls -o json

    # Inspect a local copy of a bucket
    blockscope bucket --provider filesystem --bucket ./data ls"
    )]
    Bucket(BucketArgs),

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        long_about = "Generate shell completion scripts for tab-completion.\n\n\
            Outputs a completion script for the specified shell. Add the output \
            to your shell's configuration to enable tab-completion.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Bash (add to ~/.bashrc)
    blockscope completion bash >> ~/.bashrc

    # Zsh (add to ~/.zshrc)
    blockscope completion zsh >> ~/.zshrc

    # Fish
    blockscope completion fish > ~/.config/fish/completions/blockscope.fish

    # PowerShell
    blockscope completion powershell >> $PROFILE"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Bucket selection shared by all bucket subcommands.
#[derive(Args, Debug, Clone)]
pub struct BucketArgs {
    /// Bucket holding the blocks (a directory for the filesystem provider)
    #[arg(long = "bucket", visible_alias = "gcs-bucket", value_name = "NAME")]
    pub bucket: String,

    /// Storage provider: gcs or filesystem [default: gcs]
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// GCS API endpoint, e.g. for an emulator
    #[arg(long, value_name = "URL")]
    pub gcs_endpoint: Option<String>,

    /// OAuth2 bearer token for GCS requests
    #[arg(long, env = "GCS_OAUTH_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    pub gcs_token: Option<String>,

    /// Time limit for the whole command, in seconds [default: 300]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: BucketCommand,
}

/// Bucket subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum BucketCommand {
    /// List all blocks in the bucket
    #[command(
        name = "ls",
        long_about = "List all blocks in the bucket.\n\n\
            Prints one record per block directory, in the order the bucket lists \
            them. By default only block names are printed and no metadata is \
            read. With an output format, each block's meta.json is fetched, \
            validated and printed; the first invalid block stops the listing.",
        after_help = "\
OUTPUT FORMATS:
    (empty)     block names only
    json        tab-indented metadata document per block
    <template>  Go-style text template, e.g.
                '{{.ULID}} {{.MinTime}} {{.MaxTime}} {{.Labels.env}}'
                '{{.ULID}} {{range .Compaction.Sources}}{{.}} {{end}}'
                '{{printf \"%-26s %d\" .ULID .Stats.NumSeries}}'

WORKFLOW EXAMPLES:
    # Names of blocks under a tenant prefix
    blockscope bucket --bucket my-blocks ls --prefix tenant-a

    # Compaction level of every block
    blockscope bucket --bucket my-blocks ls -o '{{.ULID}} {{.Compaction.Level}}'"
    )]
    Ls {
        /// Output format: empty, 'json', or a template
        #[arg(short, long, default_value = "", value_name = "FORMAT")]
        output: String,

        /// Only list blocks under this key prefix
        #[arg(long, default_value = "", value_name = "PREFIX")]
        prefix: String,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("blockscope").chain(args.iter().copied()))
    }

    #[test]
    fn definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bucket_ls_defaults() {
        let cli = parse(&["bucket", "--bucket", "blocks", "ls"]).unwrap();
        let Command::Bucket(args) = cli.command else {
            panic!("expected bucket command");
        };
        assert_eq!(args.bucket, "blocks");
        assert!(args.provider.is_none());
        assert!(args.timeout.is_none());
        let BucketCommand::Ls { output, prefix } = args.command;
        assert_eq!(output, "");
        assert_eq!(prefix, "");
    }

    #[test]
    fn gcs_bucket_alias() {
        let cli = parse(&["bucket", "--gcs-bucket", "blocks", "ls"]).unwrap();
        let Command::Bucket(args) = cli.command else {
            panic!("expected bucket command");
        };
        assert_eq!(args.bucket, "blocks");
    }

    #[test]
    fn output_short_flag() {
        let cli = parse(&["bucket", "--bucket", "b", "ls", "-o", "json"]).unwrap();
        let Command::Bucket(args) = cli.command else {
            panic!("expected bucket command");
        };
        let BucketCommand::Ls { output, .. } = args.command;
        assert_eq!(output, "json");
    }

    #[test]
    fn bucket_is_required() {
        let err = parse(&["bucket", "ls"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(parse(&["bucket", "--bucket", "b", "--timeout", "0", "ls"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["bucket", "--bucket", "b", "ls", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(!cli.quiet);
    }

    #[test]
    fn completion_shell() {
        let cli = parse(&["completion", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Completion { shell: Shell::Zsh }
        ));
    }
}
