use plotkit::{init_logging, Config, PlotterContext, BUILD_DATE};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    tracing::info!(
        "Plotkit {} (built {})",
        env!("CARGO_PKG_VERSION"),
        BUILD_DATE
    );

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path)?;

    let context = PlotterContext::new(config).await?;
    context.run().await
}
