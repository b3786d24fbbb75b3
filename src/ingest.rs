//! Ingestion engine: the only writer into the store.
//!
//! Live messages and history batches are written one record per transaction.
//! Each unit is idempotent, so a batch can be interrupted and redelivered (for
//! example after a reconnect) without producing duplicates.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::db::{writes, StoreError, StoreWriter};
use crate::models::MessageRecord;
use crate::normalizer::{Normalized, Normalizer};
use crate::protocol::{ConnectionState, ProtocolEvent, Session};

#[derive(Debug, Error)]
#[error("failed to store message {id} in chat {chat_jid}: {source}")]
pub struct IngestError {
    pub id: String,
    pub chat_jid: String,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    pub id: String,
    pub chat_jid: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub stored: usize,
    pub failed: Vec<FailedRecord>,
    /// Records left unwritten because shutdown was requested mid-batch.
    pub abandoned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub live_stored: usize,
    pub backfill_stored: usize,
    pub failed: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    StreamClosed,
    LoggedOut,
}

pub struct Ingestor {
    writer: StoreWriter,
    normalizer: Normalizer,
    session: Arc<Session>,
}

impl Ingestor {
    pub fn new(writer: StoreWriter, normalizer: Normalizer, session: Arc<Session>) -> Self {
        Self {
            writer,
            normalizer,
            session,
        }
    }

    pub async fn ingest_message(&self, record: MessageRecord) -> Result<(), IngestError> {
        let id = record.id.clone();
        let chat_jid = record.chat_jid.clone();
        debug!("Ingest: storing message {} in chat {}", id, chat_jid);
        self.writer
            .run_blocking(move |conn| writes::write_record(conn, &record))
            .await
            .map_err(|source| IngestError { id, chat_jid, source })
    }

    pub async fn ingest_batch(&self, records: Vec<MessageRecord>) -> BatchReport {
        self.ingest_records(records, None).await
    }

    async fn ingest_records(
        &self,
        records: Vec<MessageRecord>,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let total = records.len();

        for (idx, record) in records.into_iter().enumerate() {
            if shutdown.map_or(false, |rx| *rx.borrow()) {
                report.abandoned = total - idx;
                warn!("Ingest: shutdown requested, abandoning {} batch records", report.abandoned);
                break;
            }
            match self.ingest_message(record).await {
                Ok(()) => report.stored += 1,
                Err(e) => {
                    error!("Ingest: {}", e);
                    report.failed.push(FailedRecord {
                        id: e.id,
                        chat_jid: e.chat_jid,
                        reason: e.source.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Consumes events until the stream ends, shutdown is signalled or the
    /// session is logged out. The write unit in flight always completes before
    /// the loop observes shutdown.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<ProtocolEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> (StopReason, RunSummary) {
        let batch_shutdown = shutdown.clone();
        let mut summary = RunSummary::default();

        let reason = loop {
            if *shutdown.borrow() {
                break StopReason::Shutdown;
            }

            let event = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break StopReason::Shutdown;
                    }
                    continue;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break StopReason::StreamClosed,
                },
            };

            let Some(normalized) = self.normalizer.normalize(event) else {
                continue;
            };

            match normalized {
                Normalized::Live(record) => match self.ingest_message(record).await {
                    Ok(()) => summary.live_stored += 1,
                    Err(e) => {
                        error!("Ingest: {}", e);
                        summary.failed += 1;
                    }
                },
                Normalized::Backfill(records) => {
                    summary.batches += 1;
                    info!("Ingest: history batch {} with {} messages", summary.batches, records.len());
                    let report = self.ingest_records(records, Some(&batch_shutdown)).await;
                    summary.backfill_stored += report.stored;
                    summary.failed += report.failed.len();
                    info!(
                        "Ingest: history batch {} done, {} stored, {} failed",
                        summary.batches,
                        report.stored,
                        report.failed.len()
                    );
                    if report.abandoned > 0 {
                        break StopReason::Shutdown;
                    }
                }
                Normalized::Connection(state) => {
                    let now = self.session.apply(state);
                    if state == ConnectionState::LoggedOut || now.is_terminal() {
                        warn!("Ingest: session is {:?}, stopping event consumption", now);
                        break StopReason::LoggedOut;
                    }
                }
            }
        };

        info!(
            "Ingest: stopped ({:?}); {} live, {} backfill, {} failed",
            reason, summary.live_stored, summary.backfill_stored, summary.failed
        );
        (reason, summary)
    }
}
