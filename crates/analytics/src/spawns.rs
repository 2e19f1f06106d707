//! Nova instance spawn statistics: success and failure counts per time
//! bucket, joined into one table.

use crate::client::{SearchBackend, SearchError};
use crate::queries;
use chrono::{DateTime, Utc};
use goldstone_core::Interval;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One `date_histogram` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnBucket {
    pub key: i64,
    pub doc_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpawnRow {
    pub key: i64,
    pub successes: u64,
    pub failures: u64,
}

/// Success/failure counts ordered by bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpawnTable {
    pub rows: Vec<SpawnRow>,
}

impl SpawnTable {
    /// Outer join on bucket key; the side without a bucket counts as zero.
    pub fn merge(success: &[SpawnBucket], failure: &[SpawnBucket]) -> Self {
        let mut rows: BTreeMap<i64, SpawnRow> = BTreeMap::new();
        for b in success {
            let row = rows.entry(b.key).or_insert(SpawnRow {
                key: b.key,
                ..SpawnRow::default()
            });
            row.successes += b.doc_count;
        }
        for b in failure {
            let row = rows.entry(b.key).or_insert(SpawnRow {
                key: b.key,
                ..SpawnRow::default()
            });
            row.failures += b.doc_count;
        }
        Self {
            rows: rows.into_values().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column-oriented JSON: `{"key": {"0": k, ...}, "successes": {...}, "failures": {...}}`.
    /// An empty table is `{}`.
    pub fn to_columns(&self) -> Value {
        if self.rows.is_empty() {
            return Value::Object(Map::new());
        }

        let mut key = Map::new();
        let mut successes = Map::new();
        let mut failures = Map::new();
        for (i, row) in self.rows.iter().enumerate() {
            key.insert(i.to_string(), row.key.into());
            successes.insert(i.to_string(), row.successes.into());
            failures.insert(i.to_string(), row.failures.into());
        }

        let mut columns = Map::new();
        columns.insert("key".into(), Value::Object(key));
        columns.insert("successes".into(), Value::Object(successes));
        columns.insert("failures".into(), Value::Object(failures));
        Value::Object(columns)
    }
}

impl Serialize for SpawnTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_columns().serialize(serializer)
    }
}

/// Spawn histogram queries over one window.
pub struct SpawnData {
    backend: Arc<dyn SearchBackend>,
    index: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Interval,
}

impl SpawnData {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        index: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Self {
        Self {
            backend,
            index: index.into(),
            start,
            end,
            interval,
        }
    }

    async fn buckets(&self, success: bool) -> Result<Vec<SpawnBucket>, SearchError> {
        let q = queries::spawn_histogram_query(
            &self.start,
            &self.end,
            &self.interval.to_string(),
            success,
        );
        let rs = self.backend.search(&self.index, q).await?;

        let buckets = rs
            .pointer("/aggregations/events_by_date/buckets")
            .cloned()
            .ok_or_else(|| SearchError::MalformedResponse("missing events_by_date".into()))?;
        // Zero-count buckets from `min_doc_count: 0` stay in the series.
        serde_json::from_value(buckets).map_err(|e| SearchError::MalformedResponse(e.to_string()))
    }

    pub async fn get_spawn_success(&self) -> Result<Vec<SpawnBucket>, SearchError> {
        self.buckets(true).await
    }

    pub async fn get_spawn_failure(&self) -> Result<Vec<SpawnBucket>, SearchError> {
        self.buckets(false).await
    }

    pub async fn table(&self) -> Result<SpawnTable, SearchError> {
        let success = self.get_spawn_success().await?;
        let failure = self.get_spawn_failure().await?;
        Ok(SpawnTable::merge(&success, &failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_data::testing::ScriptedBackend;
    use chrono::TimeZone;
    use serde_json::json;

    fn bucket(key: i64, doc_count: u64) -> SpawnBucket {
        SpawnBucket { key, doc_count }
    }

    #[test]
    fn test_merge_outer_join() {
        let table = SpawnTable::merge(
            &[bucket(1000, 4), bucket(3000, 1)],
            &[bucket(2000, 2), bucket(3000, 5)],
        );
        assert_eq!(
            table.rows,
            vec![
                SpawnRow { key: 1000, successes: 4, failures: 0 },
                SpawnRow { key: 2000, successes: 0, failures: 2 },
                SpawnRow { key: 3000, successes: 1, failures: 5 },
            ]
        );
    }

    #[test]
    fn test_columns_layout() {
        let table = SpawnTable::merge(&[bucket(1000, 4)], &[]);
        assert_eq!(
            serde_json::to_value(&table).unwrap(),
            json!({"key": {"0": 1000}, "successes": {"0": 4}, "failures": {"0": 0}})
        );
        assert_eq!(SpawnTable::default().to_columns(), json!({}));
    }

    #[tokio::test]
    async fn test_table_from_backend() {
        let backend = ScriptedBackend::new(vec![
            json!({"aggregations": {"events_by_date": {"buckets": [
                {"key": 1388534400000i64, "doc_count": 3},
                {"key": 1388538000000i64, "doc_count": 0}
            ]}}}),
            json!({"aggregations": {"events_by_date": {"buckets": [
                {"key": 1388538000000i64, "doc_count": 1}
            ]}}}),
        ]);
        let start = Utc.timestamp_opt(1_388_534_400, 0).unwrap();
        let end = Utc.timestamp_opt(1_388_620_800, 0).unwrap();
        let spawns = SpawnData::new(backend.clone(), "_all", start, end, "1h".parse().unwrap());

        let table = spawns.table().await.unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].successes, 3);
        assert_eq!(table.rows[1].failures, 1);
        assert_eq!(table.rows[1].successes, 0);

        let requests = backend.requests.lock().unwrap();
        assert_eq!(
            requests[1].1["query"]["filtered"]["filter"]["term"]["event_type"],
            "compute.instance.create.error"
        );
    }

    #[tokio::test]
    async fn test_empty_intervals_kept() {
        let backend = ScriptedBackend::new(vec![json!({"aggregations": {"events_by_date": {"buckets": [
            {"key": 1388534400000i64, "doc_count": 0},
            {"key": 1388538000000i64, "doc_count": 2},
            {"key": 1388541600000i64, "doc_count": 0}
        ]}}})]);
        let start = Utc.timestamp_opt(1_388_534_400, 0).unwrap();
        let end = Utc.timestamp_opt(1_388_545_200, 0).unwrap();
        let spawns = SpawnData::new(backend.clone(), "_all", start, end, "1h".parse().unwrap());

        let success = spawns.get_spawn_success().await.unwrap();
        assert_eq!(
            success,
            vec![bucket(1388534400000, 0), bucket(1388538000000, 2), bucket(1388541600000, 0)]
        );

        let requests = backend.requests.lock().unwrap();
        assert_eq!(
            requests[0].1["aggs"]["events_by_date"]["date_histogram"]["min_doc_count"],
            0
        );
    }
}
