//! Log analytics operations: run one of the query bodies from [`crate::queries`]
//! and pull the interesting part out of the response.

use crate::client::{SearchBackend, SearchError, SortSpec};
use crate::queries;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

pub struct LogData {
    backend: Arc<dyn SearchBackend>,
    index: String,
}

/// Terms out of a `terms` facet: `facets.<name>.terms[*].term`.
fn facet_terms(response: &Value, facet: &str) -> Result<Vec<String>, SearchError> {
    let terms = response
        .pointer(&format!("/facets/{facet}/terms"))
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::MalformedResponse(format!("missing facet '{facet}'")))?;

    Ok(terms
        .iter()
        .filter_map(|t| match &t["term"] {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect())
}

fn facets_of(mut response: Value) -> Result<Value, SearchError> {
    match response.get_mut("facets") {
        Some(facets) => Ok(facets.take()),
        None => Err(SearchError::MalformedResponse("missing facets".into())),
    }
}

impl LogData {
    pub fn new(backend: Arc<dyn SearchBackend>, index: impl Into<String>) -> Self {
        Self {
            backend,
            index: index.into(),
        }
    }

    async fn search(&self, body: Value) -> Result<Value, SearchError> {
        self.backend.search(&self.index, body).await
    }

    /// Every `component` value present in the index.
    pub async fn get_components(&self) -> Result<Vec<String>, SearchError> {
        let rs = self.search(queries::components_query()).await?;
        facet_terms(&rs, "components")
    }

    /// Every `loglevel` value present in the index.
    pub async fn get_loglevels(&self) -> Result<Vec<String>, SearchError> {
        let rs = self.search(queries::loglevels_query()).await?;
        facet_terms(&rs, "loglevels")
    }

    pub async fn range_filter_facet(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
        filter_field: &str,
        filter_value: &str,
        facet_field: &str,
    ) -> Result<Value, SearchError> {
        let q = queries::range_filter_facet_query(start, end, filter_field, filter_value, facet_field);
        self.search(q).await
    }

    /// Runs [`Self::range_filter_facet`] for every value in `filter_list`,
    /// keyed by the filter value.
    pub async fn aggregate_facets(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
        filter_field: &str,
        filter_list: &[String],
        facet_field: &str,
    ) -> Result<BTreeMap<String, Value>, SearchError> {
        let mut result = BTreeMap::new();
        for filter_value in filter_list {
            let rs = self
                .range_filter_facet(start, end, filter_field, filter_value, facet_field)
                .await?;
            result.insert(filter_value.clone(), facets_of(rs)?);
        }
        Ok(result)
    }

    pub async fn err_and_warn_hist(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
        interval: &str,
        query_filter: Option<&Value>,
    ) -> Result<Value, SearchError> {
        let q = queries::err_and_warn_hist_query(start, end, interval, query_filter);
        self.search(q).await
    }

    /// Error/warning histogram facets with a bucket width derived from the
    /// display period (see [`queries::histogram_interval`]).
    pub async fn get_err_and_warn_hists(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
        period: Option<&str>,
    ) -> Result<Value, SearchError> {
        let interval = queries::histogram_interval(period);
        debug!(interval, "Error/warning histogram");
        let rs = self.err_and_warn_hist(start, end, interval, None).await?;
        facets_of(rs)
    }

    pub async fn get_err_and_warn_range(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
        first: u64,
        size: u64,
        sort: Option<&SortSpec>,
        global_filter_text: Option<&str>,
    ) -> Result<Value, SearchError> {
        let q = queries::err_and_warn_range_query(start, end, first, size, sort, global_filter_text);
        self.search(q).await
    }

    /// Hosts seen only after `short_lookback` (new) or only before it (missing),
    /// comparing `[long_lookback, short_lookback]` with `[short_lookback, end]`.
    pub async fn get_new_and_missing_nodes(
        &self,
        long_lookback: &DateTime<Utc>,
        short_lookback: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> Result<Value, SearchError> {
        let before = self
            .search(queries::host_facet_query(long_lookback, short_lookback))
            .await?;
        let after = self.search(queries::host_facet_query(short_lookback, end)).await?;

        let s1: BTreeSet<String> = facet_terms(&before, "host_facet")?.into_iter().collect();
        let s2: BTreeSet<String> = facet_terms(&after, "host_facet")?.into_iter().collect();

        let new_nodes: Vec<&String> = s2.difference(&s1).collect();
        let missing_nodes: Vec<&String> = s1.difference(&s2).collect();
        info!(
            new = new_nodes.len(),
            missing = missing_nodes.len(),
            "Node availability computed"
        );

        Ok(json!({
            "missing_nodes": missing_nodes,
            "new_nodes": new_nodes,
        }))
    }

    pub async fn get_hypervisor_stats(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
        first: u64,
        size: u64,
        sort: Option<&SortSpec>,
    ) -> Result<Value, SearchError> {
        let q = queries::hypervisor_stats_query(start, end, first, size, sort);
        self.search(q).await
    }
}

/// Keeps only the `hits` block of a search response.
pub fn hits_of(response: &Value) -> Value {
    response
        .get("hits")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every request body.
    pub struct ScriptedBackend {
        responses: Mutex<Vec<Value>>,
        pub requests: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedBackend {
        pub fn new(mut responses: Vec<Value>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(&self, index: &str, body: Value) -> Result<Value, SearchError> {
            self.requests.lock().unwrap().push((index.to_string(), body));
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| SearchError::MalformedResponse("no scripted response".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;
    use chrono::TimeZone;

    fn terms_response(facet: &str, terms: &[&str]) -> Value {
        let terms: Vec<Value> = terms
            .iter()
            .map(|t| json!({"term": t, "count": 1}))
            .collect();
        json!({"facets": {facet: {"_type": "terms", "terms": terms}}})
    }

    #[tokio::test]
    async fn test_get_components() {
        let backend = ScriptedBackend::new(vec![terms_response(
            "components",
            &["nova", "ceilometer", "keystone"],
        )]);
        let log_data = LogData::new(backend.clone(), "_all");

        let mut comps = log_data.get_components().await.unwrap();
        comps.sort();
        assert_eq!(comps, vec!["ceilometer", "keystone", "nova"]);

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].0, "_all");
        assert_eq!(requests[0].1, queries::components_query());
    }

    #[tokio::test]
    async fn test_new_and_missing_nodes() {
        let backend = ScriptedBackend::new(vec![
            terms_response("host_facet", &["compute-1", "compute-2", "controller"]),
            terms_response("host_facet", &["compute-2", "controller", "compute-3"]),
        ]);
        let log_data = LogData::new(backend.clone(), "_all");

        let long = Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap();
        let short = Utc.with_ymd_and_hms(2013, 12, 14, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2013, 12, 31, 23, 59, 59).unwrap();

        let result = log_data
            .get_new_and_missing_nodes(&long, &short, &end)
            .await
            .unwrap();
        assert_eq!(
            result,
            json!({"missing_nodes": ["compute-1"], "new_nodes": ["compute-3"]})
        );

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].1, queries::host_facet_query(&long, &short));
        assert_eq!(requests[1].1, queries::host_facet_query(&short, &end));
    }

    #[tokio::test]
    async fn test_aggregate_facets_keys_by_filter_value() {
        let backend = ScriptedBackend::new(vec![
            terms_response("loglevel", &["info", "error"]),
            terms_response("loglevel", &["warning"]),
        ]);
        let log_data = LogData::new(backend, "_all");
        let end = Utc.with_ymd_and_hms(2013, 12, 31, 23, 59, 59).unwrap();
        let start = end - chrono::Duration::weeks(52);

        let filters = vec!["nova".to_string(), "glance".to_string()];
        let result = log_data
            .aggregate_facets(&start, &end, "component", &filters, "loglevel")
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result["nova"]["loglevel"]["terms"][1]["term"], "error");
        assert_eq!(result["glance"]["loglevel"]["terms"][0]["term"], "warning");
    }

    #[tokio::test]
    async fn test_err_and_warn_hists_returns_facets() {
        let backend = ScriptedBackend::new(vec![json!({
            "hits": {"total": 3},
            "facets": {"err_facet": {"entries": []}, "warn_facet": {"entries": []}}
        })]);
        let log_data = LogData::new(backend.clone(), "_all");
        let end = Utc.with_ymd_and_hms(2013, 12, 31, 23, 59, 59).unwrap();
        let start = end - chrono::Duration::weeks(52);

        let facets = log_data
            .get_err_and_warn_hists(&start, &end, Some("day"))
            .await
            .unwrap();
        assert!(facets.get("err_facet").is_some());
        assert!(facets.get("hits").is_none());

        let requests = backend.requests.lock().unwrap();
        assert_eq!(
            requests[0].1["facets"]["err_facet"]["date_histogram"]["interval"],
            "hour"
        );
    }

    #[tokio::test]
    async fn test_missing_facet_is_malformed() {
        let backend = ScriptedBackend::new(vec![json!({"hits": {"total": 0}})]);
        let log_data = LogData::new(backend, "_all");
        assert!(matches!(
            log_data.get_loglevels().await,
            Err(SearchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_hits_of() {
        assert_eq!(hits_of(&json!({"hits": {"total": 5}})), json!({"total": 5}));
        assert_eq!(hits_of(&json!({})), json!({}));
    }
}
