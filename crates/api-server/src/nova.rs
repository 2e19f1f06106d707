//! Nova discovery and instance spawn endpoints.

use crate::rest::{search_failed, validated, window, ApiResult, AppState};
use axum::extract::{Query, State};
use axum::Json;
use goldstone_analytics::SpawnData;
use goldstone_core::{Param, RawParams};
use goldstone_management::ApiError;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Serialize, PartialEq)]
pub struct DiscoverResponse {
    pub start_ts: String,
    pub end_ts: String,
    pub interval: String,
}

/// GET /nova/discover?start&end&interval: echo the validated window.
pub async fn discover(Query(raw): Query<RawParams>) -> ApiResult<Json<DiscoverResponse>> {
    validated(&[Param::Start, Param::End, Param::Interval], &raw)?;
    Ok(Json(DiscoverResponse {
        start_ts: raw.start.unwrap_or_default(),
        end_ts: raw.end.unwrap_or_default(),
        interval: raw.interval.unwrap_or_default(),
    }))
}

/// GET /nova/spawns?start&end&interval&render
///
/// `render=False` returns the bare spawn table; otherwise it is wrapped as
/// `{"data": table}` for the page that draws it.
pub async fn spawns(
    State(state): State<AppState>,
    Query(raw): Query<RawParams>,
) -> ApiResult<Json<Value>> {
    let params = validated(&[Param::Start, Param::End, Param::Interval, Param::Render], &raw)?;
    let (start, end) = window(&params)?;
    let interval = params
        .interval
        .ok_or_else(|| ApiError::Internal("interval missing after validation".into()))?;

    let spawns = SpawnData::new(state.backend.clone(), state.index.clone(), start, end, interval);
    let table = spawns.table().await.map_err(search_failed)?;
    info!(rows = table.rows.len(), %interval, "Spawn table built");
    metrics::counter!("api.nova.spawns").increment(1);

    let columns = table.to_columns();
    Ok(Json(if params.render {
        json!({ "data": columns })
    } else {
        columns
    }))
}
