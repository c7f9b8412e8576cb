use anyhow::Result;
use tether::event::names;
use tether::{Event, FnListener, Tether, TetherConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = TetherConfig::new("tether-demo", "3.0.2")
        .provision_dir("support")
        .archive_path("support/shell-bundle.zip")
        .download_base("https://example.com/shell/releases/download")
        .args(["main.js"]);

    let app = Tether::new(config).await?;

    let listener = FnListener::arc(|e: &Event| println!("{e}"));
    app.dispatcher()
        .add_listener(&listener, false, &[names::APP_READY, names::APP_SHUTDOWN]);

    app.start().await?;
    app.send(&Event::new("window.show")).await?;
    app.wait().await;
    Ok(())
}
