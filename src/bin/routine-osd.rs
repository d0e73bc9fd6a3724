use std::path::PathBuf;

use clap::Parser;
use routine_os::config::Config;
use routine_os::daemon;
use routine_os::error::Result;

#[derive(Parser, Debug)]
#[command(name = "routine-osd")]
#[command(about = "Routine OS local daemon")]
struct Cli {
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long, env = "ROUTINE_OS_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "ROUTINE_OS_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    routine_os::logging::init_tracing("routine_osd");
    let cli = Cli::parse();
    if cli.data_dir.is_some() {
        routine_os::runtime_paths::set_app_root_override(cli.data_dir.clone());
    }
    let config = Config::resolve(cli.config.as_deref())?;
    let token = routine_os::vault::ensure_daemon_auth_token()?;

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    daemon::run(&config, &host, port, &token).await
}
