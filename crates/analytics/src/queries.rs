//! Query bodies for the log indices. Pure functions: each takes the window and
//! filter parameters and returns the JSON body for one `_search` call.

use crate::client::SortSpec;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub const TIMESTAMP_FIELD: &str = "@timestamp";
pub const HOST_FIELD: &str = "host.raw";
pub const NODEINFO_TYPE: &str = "goldstone_nodeinfo";
pub const SPAWN_SUCCESS_EVENT: &str = "compute.instance.create.end";
pub const SPAWN_FAILURE_EVENT: &str = "compute.instance.create.error";

pub fn iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn term_filter(field: &str, value: impl Into<Value>) -> Value {
    let mut term = serde_json::Map::new();
    term.insert(field.to_string(), value.into());
    json!({ "term": term })
}

pub fn range_query(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Value {
    json!({
        "range": {
            TIMESTAMP_FIELD: { "gte": iso(start), "lte": iso(end) }
        }
    })
}

fn terms_facet(field: &str, all_terms: bool) -> Value {
    json!({ "terms": { "field": field, "all_terms": all_terms } })
}

fn ordered_terms_facet(field: &str, all_terms: bool) -> Value {
    json!({ "terms": { "field": field, "all_terms": all_terms, "order": "term" } })
}

fn all_values_query(facet_name: &str, field: &str) -> Value {
    json!({
        "query": { "match_all": {} },
        "facets": { facet_name: terms_facet(field, true) }
    })
}

pub fn components_query() -> Value {
    all_values_query("components", "component")
}

pub fn loglevels_query() -> Value {
    all_values_query("loglevels", "loglevel")
}

/// Counts of `facet_field` values inside the window, restricted to documents
/// where `filter_field == filter_value`.
pub fn range_filter_facet_query(
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    filter_field: &str,
    filter_value: &str,
    facet_field: &str,
) -> Value {
    let mut facet = ordered_terms_facet(facet_field, true);
    facet["facet_filter"] = term_filter(filter_field, filter_value);

    json!({
        "query": range_query(start, end),
        "facets": { facet_field: facet }
    })
}

fn error_levels_filter() -> Value {
    json!({ "or": [term_filter("loglevel", "error"), term_filter("loglevel", "fatal")] })
}

fn and_filter(level: Value, extra: Option<&Value>) -> Value {
    match extra {
        Some(extra) => json!({ "and": [level, extra] }),
        None => level,
    }
}

/// Date histograms of errors (`error` + `fatal`) and warnings, optionally
/// narrowed by an extra filter.
pub fn err_and_warn_hist_query(
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    interval: &str,
    query_filter: Option<&Value>,
) -> Value {
    let histogram = json!({ "field": TIMESTAMP_FIELD, "interval": interval });

    json!({
        "query": range_query(start, end),
        "facets": {
            "err_facet": {
                "date_histogram": histogram,
                "facet_filter": and_filter(error_levels_filter(), query_filter)
            },
            "warn_facet": {
                "date_histogram": histogram,
                "facet_filter": and_filter(term_filter("loglevel", "warning"), query_filter)
            }
        }
    })
}

/// Bucket width one step finer than the requested display period.
pub fn histogram_interval(period: Option<&str>) -> &'static str {
    match period {
        Some("minute") => "second",
        Some("hour") => "minute",
        Some("day") => "hour",
        Some("month") => "day",
        _ => "hour",
    }
}

/// A page of error, fatal and warning events, optionally matching free text.
pub fn err_and_warn_range_query(
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    first: u64,
    size: u64,
    sort: Option<&SortSpec>,
    global_filter_text: Option<&str>,
) -> Value {
    let levels = json!({
        "or": [
            term_filter("loglevel", "error"),
            term_filter("loglevel", "fatal"),
            term_filter("loglevel", "warning")
        ]
    });

    let filter = match global_filter_text {
        Some(text) if !text.is_empty() => {
            json!({ "and": [levels, term_filter("_all", text.to_lowercase())] })
        }
        _ => levels,
    };

    let mut body = json!({
        "query": {
            "filtered": {
                "query": range_query(start, end),
                "filter": filter
            }
        },
        "from": first,
        "size": size
    });
    if let Some(sort) = sort {
        body["sort"] = json!([sort.to_json()]);
    }
    body
}

/// Distinct hosts that logged anything inside the window.
pub fn host_facet_query(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Value {
    json!({
        "query": range_query(start, end),
        "facets": { "host_facet": ordered_terms_facet(HOST_FIELD, false) }
    })
}

/// Periodic hypervisor node-info records.
pub fn hypervisor_stats_query(
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    first: u64,
    size: u64,
    sort: Option<&SortSpec>,
) -> Value {
    let mut body = json!({
        "query": {
            "filtered": {
                "filter": term_filter("type", NODEINFO_TYPE),
                "query": range_query(start, end)
            }
        },
        "from": first,
        "size": size
    });
    if let Some(sort) = sort {
        body["sort"] = json!([sort.to_json()]);
    }
    body
}

/// Instance spawn completions (or failures) bucketed by `interval`.
pub fn spawn_histogram_query(
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    interval: &str,
    success: bool,
) -> Value {
    let event = if success {
        SPAWN_SUCCESS_EVENT
    } else {
        SPAWN_FAILURE_EVENT
    };

    json!({
        "query": {
            "filtered": {
                "query": range_query(start, end),
                "filter": term_filter("event_type", event)
            }
        },
        "size": 0,
        "aggs": {
            "events_by_date": {
                "date_histogram": {
                    "field": TIMESTAMP_FIELD,
                    "interval": interval,
                    "min_doc_count": 0
                }
            }
        }
    })
}
