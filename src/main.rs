//! dualverify CLI — certify and grade dual-representation problems.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "dualverify",
    version,
    about = "Run an expression program and a SQL query side by side and certify they agree"
)]
struct Cli {
    #[command(subcommand)]
    command: dualverify::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = dualverify::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
