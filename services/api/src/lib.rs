mod cli;
mod demo;
mod infra;
mod routes;
mod server;
mod workers;

use devlink::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
