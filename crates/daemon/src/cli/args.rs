pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "strongbox")]
#[command(about = "Encrypted file storage with per-owner metadata")]
pub struct Args {
    /// Path to the strongbox state directory (defaults to ~/.strongbox)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Process-level setting override, e.g. --set KEYSTORE_PATH=/etc/key.pem
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub overrides: Vec<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
