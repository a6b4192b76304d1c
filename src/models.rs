//! Upload specification and result types.

use crate::error::{Result, UploadError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A single node or relationship record as supplied by the caller.
pub type Record = Map<String, Value>;

/// Placeholder name -> bound value.
pub type Parameters = BTreeMap<String, Value>;

fn default_true() -> bool {
    true
}

// ============================================================================
// Specification
// ============================================================================

/// Records sharing labels and a unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeGroup {
    /// Node labels; the first one is used in the MERGE/CREATE clause.
    pub labels: Vec<String>,
    /// Property that uniquely identifies a node.
    pub key: String,
    pub records: Vec<Record>,
    #[serde(default)]
    pub exclude_keys: BTreeSet<String>,
    /// MERGE on `key` when true, CREATE otherwise.
    #[serde(default = "default_true")]
    pub dedupe: bool,
}

/// Identifies the node at one end of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetNodeRef {
    /// Optional label; matching with a label is much faster.
    #[serde(default)]
    pub node_label: Option<String>,
    /// Property on the target node to match against.
    pub node_key: String,
    /// Key or dotted key path inside the relationship record holding the
    /// target node's key value.
    pub record_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipGroup {
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(alias = "from")]
    pub from_node: TargetNodeRef,
    #[serde(alias = "to")]
    pub to_node: TargetNodeRef,
    pub records: Vec<Record>,
    #[serde(default)]
    pub exclude_keys: BTreeSet<String>,
    /// Leave the endpoint record keys out of the relationship properties.
    #[serde(default = "default_true")]
    pub auto_exclude_keys: bool,
    #[serde(default = "default_true")]
    pub dedupe: bool,
}

impl RelationshipGroup {
    /// Keys kept out of the relationship property payload.
    ///
    /// With `auto_exclude_keys` these are the two endpoint record keys. A
    /// dotted record key also excludes its top-level field, which would
    /// otherwise be written onto the relationship as JSON text.
    pub fn effective_exclude_keys(&self) -> BTreeSet<String> {
        if !self.auto_exclude_keys {
            return self.exclude_keys.clone();
        }

        let mut keys = BTreeSet::new();
        for record_key in [&self.from_node.record_key, &self.to_node.record_key] {
            keys.insert(record_key.clone());
            if let Some((root, _)) = record_key.split_once('.') {
                keys.insert(root.to_string());
            }
        }
        keys
    }
}

/// Everything to upload in one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphSpecification {
    #[serde(default)]
    pub nodes: Vec<NodeGroup>,
    #[serde(default)]
    pub relationships: Vec<RelationshipGroup>,
}

impl GraphSpecification {
    /// Parse and validate a loosely typed JSON payload.
    pub fn from_value(value: Value) -> Result<Self> {
        let spec: GraphSpecification =
            serde_json::from_value(value).map_err(|e| UploadError::InvalidPayload(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        for (idx, group) in self.nodes.iter().enumerate() {
            if group.labels.is_empty() || group.labels.iter().any(|l| l.is_empty()) {
                return Err(UploadError::InvalidPayload(format!(
                    "node group {} needs at least one non-empty label",
                    idx
                )));
            }
            if group.key.is_empty() {
                return Err(UploadError::InvalidPayload(format!(
                    "node group {} ({}) has an empty key",
                    idx, group.labels[0]
                )));
            }
            if let Some(pos) = group
                .records
                .iter()
                .position(|r| r.get(&group.key).map_or(true, Value::is_null))
            {
                return Err(UploadError::InvalidPayload(format!(
                    "record {} of node group {} ({}) has no value for key '{}'",
                    pos, idx, group.labels[0], group.key
                )));
            }
        }

        for (idx, group) in self.relationships.iter().enumerate() {
            if group.rel_type.is_empty() {
                return Err(UploadError::InvalidPayload(format!(
                    "relationship group {} has an empty type",
                    idx
                )));
            }
            for (side, target) in [("from_node", &group.from_node), ("to_node", &group.to_node)] {
                if target.node_key.is_empty() || target.record_key.is_empty() {
                    return Err(UploadError::InvalidPayload(format!(
                        "relationship group {} ({}) {} needs node_key and record_key",
                        idx, group.rel_type, side
                    )));
                }
                if target.node_label.as_deref() == Some("") {
                    return Err(UploadError::InvalidPayload(format!(
                        "relationship group {} ({}) {} has an empty node_label",
                        idx, group.rel_type, side
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|g| g.records.is_empty())
            && self.relationships.iter().all(|g| g.records.is_empty())
    }
}

// ============================================================================
// Compiled output
// ============================================================================

/// A parameterized write statement ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStatement {
    pub text: String,
    pub parameters: Parameters,
    /// Property assignments carried by the statement's SET clauses.
    pub property_bindings: usize,
}

/// Write counters reported for one executed statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub nodes_created: u64,
    pub relationships_created: u64,
    pub properties_set: u64,
}

// ============================================================================
// Upload result
// ============================================================================

/// Cumulative progress and outcome of an upload.
///
/// `records_total` and `records_completed` count compiled statements, not
/// domain records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub seconds_to_complete: Option<f64>,
    pub records_total: usize,
    pub records_completed: usize,
    pub nodes_created: u64,
    pub relationships_created: u64,
    pub properties_set: u64,
    pub was_successful: bool,
    pub error_message: String,
}

impl UploadResult {
    pub fn new(started_at: DateTime<Utc>, records_total: usize) -> Self {
        Self {
            started_at,
            finished_at: None,
            seconds_to_complete: None,
            records_total,
            records_completed: 0,
            nodes_created: 0,
            relationships_created: 0,
            properties_set: 0,
            was_successful: false,
            error_message: String::new(),
        }
    }

    pub fn add_counters(&mut self, counters: &Counters) {
        self.nodes_created += counters.nodes_created;
        self.relationships_created += counters.relationships_created;
        self.properties_set += counters.properties_set;
        self.records_completed += 1;
    }

    /// Append an error without discarding earlier ones.
    pub fn push_error(&mut self, message: &str) {
        if !self.error_message.is_empty() {
            self.error_message.push('\n');
        }
        self.error_message.push_str(message);
        self.was_successful = false;
    }

    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
        self.seconds_to_complete = Some(seconds_between(self.started_at, finished_at));
        self.was_successful = self.error_message.is_empty();
    }

    /// Fraction of statements completed, between 0.0 and 1.0, two decimals.
    pub fn float_completed(&self) -> f64 {
        if self.records_total == 0 {
            return 0.0;
        }
        let fraction = self.records_completed as f64 / self.records_total as f64;
        (fraction * 100.0).round() / 100.0
    }

    /// Estimated seconds left at the current rate.
    ///
    /// Returns -1 when nothing has completed yet or no time has elapsed, and 0
    /// once every statement is done.
    pub fn projected_seconds_to_complete(&self, now: DateTime<Utc>) -> i64 {
        if self.records_completed == 0 {
            return -1;
        }
        if self.records_total <= self.records_completed {
            return 0;
        }

        let elapsed = seconds_between(self.started_at, now);
        if elapsed <= 0.0 {
            return -1;
        }

        let per_second = self.records_completed as f64 / elapsed;
        let remaining = (self.records_total - self.records_completed) as f64;
        (remaining / per_second) as i64
    }

    pub fn projected_completion_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.projected_seconds_to_complete(now).max(0))
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}
