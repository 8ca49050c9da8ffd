#[tokio::main]
async fn main() -> anyhow::Result<()> {
    climrisk_observability::init();

    let app = match std::env::var("DATABASE_URL") {
        Ok(database_url) => climrisk_api::app::build_postgres_app(&database_url).await?,
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores with an in-process worker");
            climrisk_api::app::build_in_memory_app()
        }
    };

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
