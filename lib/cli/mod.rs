use crate::build_info;
use crate::commands::{CommonArgs, CompactArgs, WatchArgs};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    about = "Offline operation outbox for mobile warehouse scanners",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show per-state record counts and dead-lettered records
    Status {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Run one sync pass against the backend and exit
    Sync {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Delete synced records older than the retention window
    Compact {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        compact: CompactArgs,
    },
    /// Watch connectivity and sync on every reconnect until interrupted
    Watch {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        watch: WatchArgs,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use crate::build_info;
    use clap::{error::ErrorKind, Parser};

    #[test]
    fn version_short_circuits_other_flags() {
        let err = Cli::try_parse_from(["mde-outbox", "--version", "--this-flag-does-not-exist"])
            .expect_err("expected clap to stop parsing after --version");

        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
        assert!(
            err.to_string().contains(build_info::VERSION_WITH_COMMIT),
            "version output should include semver+commit hash"
        );
    }

    #[test]
    fn subcommand_is_required() {
        let err = Cli::try_parse_from(["mde-outbox"]).expect_err("expected missing subcommand");
        assert_eq!(
            err.kind(),
            ErrorKind::MissingSubcommand,
            "bare invocation should demand a subcommand"
        );
    }
}
