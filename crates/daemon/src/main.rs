// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Cat, Init, Ls, Put, Version};

command_enum! {
    (Init, Init),
    (Put, Put),
    (Cat, Cat),
    (Ls, Ls),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let ctx = cli::op::OpContext::new(args.config_path, args.overrides);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
