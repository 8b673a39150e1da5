use clap::Parser;
use paisa_core::NotificationCategory;
use paisa_gateway::{AppState, serve};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "paisa-gateway")]
struct GatewayArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind_address: String,

    /// Require this session token on every request.
    #[arg(long)]
    session_token: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = GatewayArgs::parse();
    let state = match args.session_token {
        Some(token) => AppState::with_session_token(token),
        None => AppState::new(),
    };

    // Seed a couple of payees and a notification so a fresh dev gateway has
    // something to answer with.
    state.register_payee("ravi@okbank", "Ravi Kumar").await;
    state.register_payee("meera@paisa", "Meera Shah").await;
    state
        .push_notification(
            "Welcome to Paisa",
            "Your wallet is ready to use.",
            NotificationCategory::Info,
        )
        .await;

    let listener = match tokio::net::TcpListener::bind(&args.bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {}: {}", args.bind_address, err);
            std::process::exit(1);
        }
    };

    info!("gateway starting on {}", args.bind_address);
    if let Err(err) = serve(listener, state).await {
        warn!("gateway exited: {}", err);
    }
}
