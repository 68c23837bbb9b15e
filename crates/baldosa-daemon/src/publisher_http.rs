//! HTTP client for the downstream tile publisher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use baldosa_map::ledger::Ledger;
use baldosa_map::publisher::Publisher;
use baldosa_map::{MapError, Result};
use baldosa_types::Coords;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
struct ProcessRequest<'a> {
    x: i32,
    y: i32,
    title: &'a str,
    subtitle: &'a str,
    link: &'a str,
}

/// Sends a tile's current content to `POST {addr}/process`.
///
/// Each call is bounded by the client timeout and is not retried. Anything
/// other than `200 OK` is a failure.
pub struct HttpPublisher {
    client: Client,
    addr: String,
    api_key: String,
    ledger: Arc<dyn Ledger>,
}

impl HttpPublisher {
    pub fn new(
        addr: &str,
        api_key: impl Into<String>,
        timeout: Duration,
        ledger: Arc<dyn Ledger>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            addr: addr.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            ledger,
        })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, coords: Coords) -> Result<()> {
        let tile = self
            .ledger
            .get_tile(coords)
            .await?
            .ok_or_else(|| MapError::NotFound(format!("tile {coords}")))?;

        let body = ProcessRequest {
            x: tile.x,
            y: tile.y,
            title: &tile.title,
            subtitle: tile.subtitle.as_deref().unwrap_or_default(),
            link: tile.link.as_deref().unwrap_or_default(),
        };

        let response = self
            .client
            .post(format!("{}/process", self.addr))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(x = coords.x, y = coords.y, error = %e, "publisher request failed");
                MapError::Publish(e.to_string())
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            error!(x = coords.x, y = coords.y, %status, "publisher rejected tile");
            return Err(MapError::Publish(format!("publisher returned {status}")));
        }

        debug!(x = coords.x, y = coords.y, "publisher accepted tile");
        Ok(())
    }
}
