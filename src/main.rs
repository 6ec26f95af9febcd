use clap::Parser;
use rfrender::cdp::ChromeLauncher;
use rfrender::config::ServiceConfig;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::parse();
    let launcher = ChromeLauncher::new(config.engine_config());

    if let Err(e) = rfrender::server::run(config, launcher).await {
        log::error!("Render service failed: {}", e);
        std::process::exit(1);
    }
}
