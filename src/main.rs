use voxrelay::config::RelayConfig;
use voxrelay::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local development keys live in .env; absence is fine in production
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = RelayConfig::from_env();
    server::run(config).await
}
