use clap::Parser;
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/worklog.db)
  PORT        (default: 5750 or config.listen_port)
"#;

#[derive(Debug, Parser)]
#[command(
    name = "worklog-server",
    version,
    about = "Worklog time tracking & invoicing server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(long)]
    pub port: Option<u16>,
}
