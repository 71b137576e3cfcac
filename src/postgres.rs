// ABOUTME: PostgreSQL connection helpers shared by the source and warehouse sides
// ABOUTME: TLS-capable connect with a small bounded retry for transient failures

use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::Client;

use crate::utils::sanitize_url;

/// Connect to a PostgreSQL database, negotiating TLS when the server
/// requests it. The connection task is spawned and logs on failure.
pub async fn connect(url: &str) -> Result<Client> {
    let connector = TlsConnector::builder()
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(connector);

    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .with_context(|| format!("Failed to connect to {}", sanitize_url(url)))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Database connection error: {}", e);
        }
    });

    Ok(client)
}

/// Connect with up to three attempts and a doubling delay, for riding out
/// transient network hiccups without involving the scheduler-level retry.
pub async fn connect_with_retry(url: &str) -> Result<Client> {
    let max_attempts = 3;
    let mut delay = Duration::from_secs(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match connect(url).await {
            Ok(client) => return Ok(client),
            Err(e) => {
                if attempt < max_attempts {
                    tracing::warn!(
                        "Connection to {} failed (attempt {}/{}), retrying in {:?}...",
                        sanitize_url(url),
                        attempt,
                        max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Connection failed after retries")))
}
