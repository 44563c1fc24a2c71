use std::sync::Arc;

use orglicense_infra::{
    InMemoryStore, PostgresStore, RenewalSweeper, Store, DEFAULT_SWEEP_INTERVAL,
};

#[tokio::main]
async fn main() {
    orglicense_observability::init();

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });

    let store: Arc<dyn Store> = match std::env::var("DATABASE_URL") {
        Ok(url) => Arc::new(
            PostgresStore::connect(&url)
                .await
                .expect("failed to initialize postgres store"),
        ),
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    let (app, services) = orglicense_api::app::build_app(jwt_secret, store).await;
    let sweeper = RenewalSweeper::spawn(services.licenses.clone(), DEFAULT_SWEEP_INTERVAL);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {bind_addr}: {err}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .unwrap();

    sweeper.shutdown().await;
}
