//! Audit trail entry
//!
//! Each entry commits to the hash of its predecessor, so editing or removing
//! any line breaks every hash after it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

pub const ZERO_HASH: &str =
    "sha256:0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Genesis,
    Merge,
    GateOverride,
    MergeFailure,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::Genesis => "genesis",
            AuditEvent::Merge => "merge",
            AuditEvent::GateOverride => "gate_override",
            AuditEvent::MergeFailure => "merge_failure",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub sequence: u64,
    pub event: AuditEvent,
    pub timestamp: DateTime<Utc>,
    pub server_id: String,
    /// Change set the event concerns, empty for genesis
    pub subject: String,
    /// sha256 of the serialized event payload
    pub payload_hash: String,
    pub previous_log_hash: String,
    pub this_log_hash: String,
    pub metadata: BTreeMap<String, String>,
}

pub fn sha256_prefixed(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

impl AuditLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        event: AuditEvent,
        timestamp: DateTime<Utc>,
        server_id: String,
        subject: String,
        payload_hash: String,
        previous_log_hash: String,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        let mut entry = Self {
            sequence,
            event,
            timestamp,
            server_id,
            subject,
            payload_hash,
            previous_log_hash,
            this_log_hash: String::new(),
            metadata,
        };
        entry.this_log_hash = entry.calculate_hash();
        entry
    }

    pub fn canonical_string(&self) -> String {
        let metadata: Vec<String> = self
            .metadata
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();

        format!(
            "sequence:{}|event:{}|timestamp:{}|server_id:{}|subject:{}|payload_hash:{}|previous_log_hash:{}|metadata:{}",
            self.sequence,
            self.event,
            self.timestamp.to_rfc3339(),
            self.server_id,
            self.subject,
            self.payload_hash,
            self.previous_log_hash,
            metadata.join(",")
        )
    }

    pub fn calculate_hash(&self) -> String {
        sha256_prefixed(self.canonical_string().as_bytes())
    }

    pub fn verify_hash(&self) -> bool {
        self.this_log_hash == self.calculate_hash()
    }

    pub fn summary(&self) -> String {
        format!("#{} {} {} ({})", self.sequence, self.event, self.subject, self.payload_hash)
    }
}

pub fn create_genesis_entry(server_id: String) -> AuditLogEntry {
    let mut metadata = BTreeMap::new();
    metadata.insert("description".to_string(), "Genesis entry".to_string());

    AuditLogEntry::new(
        0,
        AuditEvent::Genesis,
        Utc::now(),
        server_id,
        String::new(),
        ZERO_HASH.to_string(),
        ZERO_HASH.to_string(),
        metadata,
    )
}
