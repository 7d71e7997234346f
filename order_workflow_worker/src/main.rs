use dotenvy::dotenv;
use log::info;
use order_workflow_worker::{cli::handle_command_line_args, config::WorkerConfig, worker::run_worker};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    if handle_command_line_args() {
        return;
    }
    let config = WorkerConfig::from_env_or_default();

    info!("🚀️ Starting order workflow worker against {}", config.database_url);
    match run_worker(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}
