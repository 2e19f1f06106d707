//! Log intelligence endpoints: facet lists, the error/warning cockpit, log
//! search, node churn and hypervisor stats.

use crate::rest::{search_failed, ApiResult, AppState};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use goldstone_analytics::log_data::hits_of;
use goldstone_analytics::{SortOrder, SortSpec};
use goldstone_core::params::parse_timestamp;
use goldstone_core::time::calc_start;
use goldstone_core::{Param, RawParams};
use goldstone_management::ApiError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const DEFAULT_PAGE_SIZE: u64 = 10;

/// GET /intelligence/log/components
pub async fn components(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let comps = state.log_data().get_components().await.map_err(search_failed)?;
    Ok(Json(comps))
}

/// GET /intelligence/log/loglevels
pub async fn loglevels(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let levels = state.log_data().get_loglevels().await.map_err(search_failed)?;
    Ok(Json(levels))
}

#[derive(Debug, Deserialize)]
pub struct FacetQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub filter_field: Option<String>,
    /// One value or a comma-separated list.
    pub filter_value: Option<String>,
    pub facet_field: Option<String>,
}

fn required(value: &Option<String>, name: &str, errors: &mut Vec<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => {
            errors.push(format!("parameter missing [{name}]"));
            String::new()
        }
    }
}

/// Validate `start`/`end`, keeping the messages so callers can add their own.
fn window_or_errors(raw: &RawParams) -> (Option<(DateTime<Utc>, DateTime<Utc>)>, Vec<String>) {
    match goldstone_core::params::validate(&[Param::Start, Param::End], raw) {
        Ok(params) => (params.start.zip(params.end), Vec::new()),
        Err(errors) => {
            warn!(errors = ?errors, "Rejected request parameters");
            (None, errors)
        }
    }
}

fn page_param(value: Option<&str>, name: &str, default: u64, errors: &mut Vec<String>) -> u64 {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            errors.push(format!("malformed parameter [{name}]"));
            default
        }),
    }
}

fn order_param(value: Option<&str>, errors: &mut Vec<String>) -> SortOrder {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("desc") => SortOrder::Desc,
        Some("asc") => SortOrder::Asc,
        Some(_) => {
            errors.push("malformed parameter [order]".to_string());
            SortOrder::Desc
        }
    }
}

fn checked<T>(value: Option<T>, errors: Vec<String>) -> ApiResult<T> {
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    value.ok_or_else(|| ApiError::Internal("time window missing after validation".into()))
}

/// GET /intelligence/log/facets: `facet_field` counts per `filter_value`.
pub async fn facets(
    State(state): State<AppState>,
    Query(q): Query<FacetQuery>,
) -> ApiResult<Json<BTreeMap<String, Value>>> {
    let raw = RawParams {
        start: q.start.clone(),
        end: q.end.clone(),
        ..RawParams::default()
    };
    let (window, mut errors) = window_or_errors(&raw);
    let filter_field = required(&q.filter_field, "filter_field", &mut errors);
    let filter_value = required(&q.filter_value, "filter_value", &mut errors);
    let facet_field = required(&q.facet_field, "facet_field", &mut errors);
    let (start, end) = checked(window, errors)?;
    let filter_list: Vec<String> = filter_value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();

    let result = state
        .log_data()
        .aggregate_facets(&start, &end, &filter_field, &filter_list, &facet_field)
        .await
        .map_err(search_failed)?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct CockpitQuery {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Display period: `minute`, `hour`, `day`, `week` or `month`.
    pub interval: Option<String>,
}

/// GET /intelligence/log/cockpit/data: error/warning histograms.
///
/// `end_time` defaults to now and `start_time` to one display period
/// before it.
pub async fn cockpit_data(
    State(state): State<AppState>,
    Query(q): Query<CockpitQuery>,
) -> ApiResult<Json<Value>> {
    let period = q.interval.as_deref().unwrap_or("hour");
    let mut errors = Vec::new();

    let end = match q.end_time.as_deref() {
        None => Utc::now(),
        Some(ts) => parse_timestamp(ts).unwrap_or_else(|| {
            errors.push("malformed parameter [end_time]".to_string());
            Utc::now()
        }),
    };
    let start = match q.start_time.as_deref() {
        None => calc_start(end, period),
        Some(ts) => parse_timestamp(ts).unwrap_or_else(|| {
            errors.push("malformed parameter [start_time]".to_string());
            end
        }),
    };
    if errors.is_empty() && start > end {
        errors.push("malformed parameter [start_time]".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    debug!(%start, %end, period, "Cockpit histogram");
    let facets = state
        .log_data()
        .get_err_and_warn_hists(&start, &end, Some(period))
        .await
        .map_err(search_failed)?;
    Ok(Json(facets))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub first: Option<String>,
    pub size: Option<String>,
    pub sort: Option<String>,
    /// `asc` or `desc` (the default).
    pub order: Option<String>,
    pub search: Option<String>,
}

/// GET /intelligence/log/search/data: paged error/warning/fatal events.
pub async fn search_data(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let raw = RawParams {
        start: q.start_time.clone(),
        end: q.end_time.clone(),
        ..RawParams::default()
    };
    let (window, mut errors) = window_or_errors(&raw);
    let first = page_param(q.first.as_deref(), "first", 0, &mut errors);
    let size = page_param(q.size.as_deref(), "size", DEFAULT_PAGE_SIZE, &mut errors);
    let order = order_param(q.order.as_deref(), &mut errors);
    let (start, end) = checked(window, errors)?;

    let sort = q
        .sort
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|field| SortSpec::new(field, order));

    let rs = state
        .log_data()
        .get_err_and_warn_range(
            &start,
            &end,
            first,
            size,
            sort.as_ref(),
            q.search.as_deref(),
        )
        .await
        .map_err(search_failed)?;
    Ok(Json(hits_of(&rs)))
}

#[derive(Debug, Deserialize)]
pub struct NodesQuery {
    pub long_lookback: Option<String>,
    pub short_lookback: Option<String>,
    pub end: Option<String>,
}

fn timestamp_param(value: Option<&str>, name: &str, errors: &mut Vec<String>) -> Option<DateTime<Utc>> {
    match value {
        None => {
            errors.push(format!("parameter missing [{name}]"));
            None
        }
        Some(ts) => {
            let parsed = parse_timestamp(ts);
            if parsed.is_none() {
                errors.push(format!("malformed parameter [{name}]"));
            }
            parsed
        }
    }
}

/// GET /intelligence/nodes/new_and_missing
pub async fn new_and_missing_nodes(
    State(state): State<AppState>,
    Query(q): Query<NodesQuery>,
) -> ApiResult<Json<Value>> {
    let mut errors = Vec::new();
    let long = timestamp_param(q.long_lookback.as_deref(), "long_lookback", &mut errors);
    let short = timestamp_param(q.short_lookback.as_deref(), "short_lookback", &mut errors);
    let end = timestamp_param(q.end.as_deref(), "end", &mut errors);

    let (Some(long), Some(short), Some(end)) = (long, short, end) else {
        return Err(ApiError::Validation(errors));
    };
    if !(long <= short && short <= end) {
        return Err(ApiError::Validation(vec![
            "malformed parameter [short_lookback]".to_string(),
        ]));
    }

    let nodes = state
        .log_data()
        .get_new_and_missing_nodes(&long, &short, &end)
        .await
        .map_err(search_failed)?;
    Ok(Json(nodes))
}

#[derive(Debug, Deserialize)]
pub struct HypervisorQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub first: Option<String>,
    pub size: Option<String>,
}

/// GET /intelligence/compute/hypervisor: node info documents, oldest first.
pub async fn hypervisor_stats(
    State(state): State<AppState>,
    Query(q): Query<HypervisorQuery>,
) -> ApiResult<Json<Value>> {
    let raw = RawParams {
        start: q.start.clone(),
        end: q.end.clone(),
        ..RawParams::default()
    };
    let (window, mut errors) = window_or_errors(&raw);
    let first = page_param(q.first.as_deref(), "first", 0, &mut errors);
    let size = page_param(q.size.as_deref(), "size", DEFAULT_PAGE_SIZE, &mut errors);
    let (start, end) = checked(window, errors)?;
    let sort = SortSpec::new("@timestamp", SortOrder::Asc);

    let rs = state
        .log_data()
        .get_hypervisor_stats(
            &start,
            &end,
            first,
            size,
            Some(&sort),
        )
        .await
        .map_err(search_failed)?;
    Ok(Json(hits_of(&rs)))
}
