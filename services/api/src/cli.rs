use crate::demo::{run_demo, run_rank, run_token, DemoArgs, RankArgs, TokenArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use shift_cover::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Shift Cover",
    about = "Run the sick-call coverage service or exercise it from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a sick call from intake to coverage against a sample roster
    Demo(DemoArgs),
    /// Print the ranked replacement list for one shift in a roster export
    Rank(RankArgs),
    /// Issue a bearer token for local testing against `serve`
    Token(TokenArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Staff CSV export to load at startup
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
    /// Shift CSV export to load at startup (requires --roster)
    #[arg(long, requires = "roster")]
    pub(crate) schedule: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Rank(args) => run_rank(args),
        Command::Token(args) => run_token(args),
    }
}
