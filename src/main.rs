use mde_outbox_lib::cli::{parse_args, Command};
use mde_outbox_lib::commands::{run_compact, run_status, run_sync_once, run_watch};

#[tokio::main]
async fn main() {
    let cli = parse_args();

    let exit_code = match cli.command {
        Command::Status { common } => run_status(common).await,
        Command::Sync { common } => run_sync_once(common).await,
        Command::Compact { common, compact } => run_compact(common, compact).await,
        Command::Watch { common, watch } => run_watch(common, watch).await,
    };

    std::process::exit(exit_code);
}
