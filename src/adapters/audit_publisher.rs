//! Audit Publisher Adapters
//!
//! Sinks for the audit records the use cases emit: the log stream and an
//! in-process buffer.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::Level;

use crate::domain::events::{AuditMethod, AuditRecord};
use crate::domain::ports::AuditPublisher;
use crate::error::Result;

/// Writes each record to the tracing stream as one structured event.
#[derive(Debug, Clone)]
pub struct LoggingAuditPublisher {
    level: Level,
}

impl Default for LoggingAuditPublisher {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LoggingAuditPublisher {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

#[async_trait]
impl AuditPublisher for LoggingAuditPublisher {
    async fn publish(&self, record: AuditRecord) -> Result<()> {
        let request = record.request.to_string();

        // tracing needs the level at the call site
        macro_rules! emit {
            ($lvl:expr) => {
                tracing::event!(
                    target: "audit",
                    $lvl,
                    audit_id = %record.id,
                    method = %record.method,
                    request = %request,
                    at = %record.timestamp.to_rfc3339(),
                    "Audit record"
                )
            };
        }

        match self.level {
            Level::ERROR => emit!(Level::ERROR),
            Level::WARN => emit!(Level::WARN),
            Level::INFO => emit!(Level::INFO),
            Level::DEBUG => emit!(Level::DEBUG),
            Level::TRACE => emit!(Level::TRACE),
        }

        Ok(())
    }
}

/// Keeps published records in memory, oldest first.
///
/// With a capacity, the oldest record is dropped once the buffer is full.
#[derive(Debug, Default)]
pub struct InMemoryAuditCollector {
    records: parking_lot::RwLock<VecDeque<AuditRecord>>,
    capacity: Option<usize>,
}

impl InMemoryAuditCollector {
    /// Unbounded collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector holding at most `capacity` records
    pub fn bounded(capacity: usize) -> Self {
        Self {
            records: parking_lot::RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Records of one operation, oldest first
    pub fn records_of(&self, method: AuditMethod) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Most recent record, if any
    pub fn last(&self) -> Option<AuditRecord> {
        self.records.read().back().cloned()
    }
}

#[async_trait]
impl AuditPublisher for InMemoryAuditCollector {
    async fn publish(&self, record: AuditRecord) -> Result<()> {
        let mut records = self.records.write();
        match self.capacity {
            Some(0) => return Ok(()),
            Some(capacity) if records.len() >= capacity => {
                records.pop_front();
            }
            _ => {}
        }
        records.push_back(record);
        Ok(())
    }
}
