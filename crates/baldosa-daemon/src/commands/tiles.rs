//! Tile and availability command handlers.

use std::sync::Arc;

use baldosa_types::{ChunkOrigin, Coords, TileContent, CHUNK_SIZE};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::rpc::{parse_params, RpcError};
use crate::state::DaemonState;

type Result = std::result::Result<Value, RpcError>;

#[derive(Debug, Deserialize)]
struct CellParams {
    x: i32,
    y: i32,
}

#[derive(Debug, Deserialize)]
struct PurchaseParams {
    user: String,
    x: i32,
    y: i32,
}

#[derive(Debug, Deserialize)]
struct EditParams {
    user: String,
    x: i32,
    y: i32,
    #[serde(flatten)]
    content: TileContent,
}

#[derive(Debug, Deserialize)]
struct ImageUploadParams {
    user: String,
    x: i32,
    y: i32,
    content_type: String,
}

fn to_value<T: serde::Serialize>(value: &T) -> Result {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&e.to_string()))
}

fn origin_json(origin: ChunkOrigin) -> Value {
    serde_json::json!({"x": origin.x(), "y": origin.y()})
}

/// Availability bitmap of the chunk containing `(x, y)`, base64-encoded,
/// with the origin it was resolved to.
pub async fn get_chunk_bitmap(state: &Arc<DaemonState>, params: &Value) -> Result {
    let CellParams { x, y } = parse_params(params)?;
    let bitmap = state.map.chunk_bitmap(x, y).await?;
    Ok(serde_json::json!({
        "origin": origin_json(bitmap.origin()),
        "size": CHUNK_SIZE,
        "bitmap": STANDARD.encode(bitmap.as_bytes()),
    }))
}

/// Rebuild the chunk containing `(x, y)` from the ledger.
pub async fn recompute_chunk(state: &Arc<DaemonState>, params: &Value) -> Result {
    let CellParams { x, y } = parse_params(params)?;
    let bitmap = state.map.recompute(ChunkOrigin::containing(x, y)).await?;
    Ok(serde_json::json!({
        "origin": origin_json(bitmap.origin()),
        "owned": bitmap.owned_count(),
    }))
}

/// Republish queue counters.
pub async fn get_queue_stats(state: &Arc<DaemonState>) -> Result {
    let stats = state.republish.stats();
    Ok(serde_json::json!({
        "accepted": stats.accepted(),
        "dropped": stats.dropped(),
    }))
}

/// The tile at a cell, or its price when free.
pub async fn get_tile(state: &Arc<DaemonState>, params: &Value) -> Result {
    let CellParams { x, y } = parse_params(params)?;
    let quote = state.purchases.quote(Coords::new(x, y)).await?;
    to_value(&quote)
}

pub async fn purchase(state: &Arc<DaemonState>, params: &Value) -> Result {
    let PurchaseParams { user, x, y } = parse_params(params)?;
    let tile = state.purchases.purchase(&user, Coords::new(x, y)).await?;
    to_value(&tile)
}

pub async fn edit_tile(state: &Arc<DaemonState>, params: &Value) -> Result {
    let EditParams {
        user,
        x,
        y,
        content,
    } = parse_params(params)?;
    let tile = state.editor.edit(&user, Coords::new(x, y), content).await?;
    to_value(&tile)
}

pub async fn prepare_image_upload(state: &Arc<DaemonState>, params: &Value) -> Result {
    let ImageUploadParams {
        user,
        x,
        y,
        content_type,
    } = parse_params(params)?;
    let upload = state
        .editor
        .prepare_image_upload(&user, Coords::new(x, y), &content_type)
        .await?;
    to_value(&upload)
}
