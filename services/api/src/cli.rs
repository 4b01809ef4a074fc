use crate::demo::{run_demo, DemoArgs};
use crate::server;
use crate::workers::{self, InterviewArgs, NotificationArgs};
use clap::{Args, Parser, Subcommand};
use devlink::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "DevLink",
    about = "Run the DevLink job application pipeline services from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the edge router (default command)
    Gateway(ServeArgs),
    /// Start the application intake service and its outbox relay
    Applications(ServeArgs),
    /// Consume application events and schedule interviews
    Interviews(InterviewArgs),
    /// Consume interview events and notify candidates
    Notifications(NotificationArgs),
    /// Run the whole pipeline in-process against in-memory backends
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Gateway(ServeArgs::default()));

    match command {
        Command::Gateway(args) => server::run_gateway(args).await,
        Command::Applications(args) => server::run_applications(args).await,
        Command::Interviews(args) => workers::run_interviews(args).await,
        Command::Notifications(args) => workers::run_notifications(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
