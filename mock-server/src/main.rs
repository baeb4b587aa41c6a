use mock_server::{MockState, Store};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");

    // Item 1 exists so clients have something to probe on connect.
    let store = Store::default().with_item("Task", "Connection probe");
    let mut state = MockState::new(store);
    if let (Ok(user), Ok(password)) = (
        std::env::var("MOCK_TFS_USER"),
        std::env::var("MOCK_TFS_PASSWORD"),
    ) {
        info!(user = %user, "basic authentication enabled");
        state = state.with_credentials(&user, &password);
    }

    let listener = TcpListener::bind(&addr).await?;
    info!(address = %addr, "listening");
    mock_server::run(listener, state).await
}
