use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devbox::api::{self, AppState};
use devbox::provider::{HttpProvider, SandboxProvider};
use devbox::Config;

#[derive(Parser)]
#[command(name = "devbox")]
#[command(about = "Ephemeral sandbox sessions with live dependency installation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000", env = "DEVBOX_PORT")]
        port: u16,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "devbox=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(port: u16) -> anyhow::Result<()> {
    let config = Config::from_env();

    // Without a credential every session is a demo session.
    let provider: Option<Arc<dyn SandboxProvider>> = match config.credential() {
        Ok(key) => Some(Arc::new(HttpProvider::new(
            config.provider_url.clone(),
            Some(key.to_string()),
        ))),
        Err(e) => {
            tracing::warn!("{}; sessions will run in demo mode", e);
            None
        }
    };

    let app = api::create_router(AppState::new(provider, config));

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("devbox listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve { port }) => serve(port).await,
        None => serve(3000).await,
    }
}
