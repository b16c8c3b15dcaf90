//! Append-only JSONL audit trail

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::audit::entry::{create_genesis_entry, sha256_prefixed, AuditEvent, AuditLogEntry};
use crate::audit::verify::{load_audit_log_from_file, verify_audit_log};

struct Head {
    file: File,
    hash: String,
    next_sequence: u64,
}

#[derive(Clone)]
pub struct AuditLogger {
    log_path: PathBuf,
    server_id: String,
    head: Arc<Mutex<Head>>,
}

impl AuditLogger {
    /// Open the trail at `log_path`. An existing file is verified before
    /// appending; a new file starts with a genesis entry.
    pub fn open(log_path: impl Into<PathBuf>, server_id: String) -> Result<Self> {
        let log_path = log_path.into();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow!("Failed to create log directory: {}", e))?;
        }

        let existing = if log_path.exists() {
            load_audit_log_from_file(&log_path)?
        } else {
            Vec::new()
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| anyhow!("Failed to open audit log file: {}", e))?;

        let head = if existing.is_empty() {
            let genesis = create_genesis_entry(server_id.clone());
            write_entry(&mut file, &genesis)?;
            Head {
                file,
                hash: genesis.this_log_hash,
                next_sequence: 1,
            }
        } else {
            verify_audit_log(&existing)?;
            let last = &existing[existing.len() - 1];
            info!("Loaded {} existing audit entries", existing.len());
            Head {
                file,
                hash: last.this_log_hash.clone(),
                next_sequence: last.sequence + 1,
            }
        };

        Ok(Self {
            log_path,
            server_id,
            head: Arc::new(Mutex::new(head)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Append an event whose payload is committed to by hash
    pub async fn record<P: Serialize>(
        &self,
        event: AuditEvent,
        subject: &str,
        payload: &P,
        metadata: BTreeMap<String, String>,
    ) -> Result<AuditLogEntry> {
        let payload_hash = sha256_prefixed(&serde_json::to_vec(payload)?);

        let mut head = self.head.lock().await;
        let entry = AuditLogEntry::new(
            head.next_sequence,
            event,
            Utc::now(),
            self.server_id.clone(),
            subject.to_string(),
            payload_hash,
            head.hash.clone(),
            metadata,
        );

        write_entry(&mut head.file, &entry)?;
        head.hash = entry.this_log_hash.clone();
        head.next_sequence += 1;

        debug!("Appended audit entry: {}", entry.summary());
        Ok(entry)
    }

    pub async fn get_head_hash(&self) -> String {
        self.head.lock().await.hash.clone()
    }

    pub async fn get_entry_count(&self) -> u64 {
        self.head.lock().await.next_sequence
    }
}

fn write_entry(file: &mut File, entry: &AuditLogEntry) -> Result<()> {
    let json = serde_json::to_string(entry)?;
    writeln!(file, "{}", json).map_err(|e| anyhow!("Failed to write to audit log: {}", e))?;
    file.flush()
        .map_err(|e| anyhow!("Failed to flush audit log: {}", e))?;
    Ok(())
}
