//! Log and event analytics over the Elasticsearch indices fed by the
//! OpenStack hosts: facet counts, error/warning histograms, host churn and
//! instance spawn statistics.

pub mod client;
pub mod log_data;
pub mod queries;
pub mod spawns;

pub use client::{EsClient, SearchBackend, SearchError, SortOrder, SortSpec};
pub use log_data::LogData;
pub use spawns::{SpawnBucket, SpawnData, SpawnTable};
