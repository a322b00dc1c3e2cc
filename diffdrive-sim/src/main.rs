use diffdrive_sim::run;
use diffdrive_sim::settings::Settings;

#[tokio::main]
async fn main() {
    let settings = Settings::new().expect("Failed to load settings.");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logger.level.clone().into()),
        )
        .init();

    match run(&settings).await {
        Ok(statuses) => tracing::info!("route finished: {statuses:?}"),
        Err(error) => {
            tracing::error!("simulation failed: {error}");
            std::process::exit(1);
        }
    }
}
