//! Ingest command implementation

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use strata_core::{Clock, DocPath, DocumentStore, StoreTxn, SystemClock};
use strata_engine::{ChunkedWriter, ProcessorRegistry, TriggerOutcome, TxnSink};

/// One line of the input file
#[derive(Debug, Deserialize)]
struct IngestRecord {
    path: String,
    data: Value,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl IngestRecord {
    /// Event document as stored: producer metadata plus the engine-owned
    /// fields, which always start out unprocessed.
    fn into_event(self, now: i64) -> Result<(DocPath, Value)> {
        let path = DocPath::parse(&self.path)?;
        let mut metadata = self.metadata;
        metadata
            .entry("id")
            .or_insert_with(|| Value::from(path.id()));
        metadata.entry("timestamp").or_insert_with(|| Value::from(now));
        metadata.insert("updatedAt".into(), Value::from(now));
        metadata.insert("processed".into(), Value::Bool(false));
        metadata.remove("quarantined");
        Ok((path, json!({ "data": self.data, "metadata": metadata })))
    }
}

/// Totals of one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Events written as new documents
    pub created: usize,
    /// Records whose document already existed, left untouched
    pub skipped: usize,
    /// Transactions committed
    pub chunks: usize,
}

/// Write the records that do not exist yet, in one transaction.
///
/// Redelivered events keep their stored metadata, so `processed` never
/// goes back to false. Returns the paths that were created.
fn create_missing<S: DocumentStore>(
    store: &S,
    records: &[(DocPath, Value)],
) -> Result<Vec<DocPath>> {
    let created = store.run_transaction(|txn| {
        let mut seen = BTreeSet::new();
        let mut fresh = Vec::new();
        for (path, event) in records {
            if !seen.insert(path) {
                continue;
            }
            if txn.get(path)?.is_none() {
                fresh.push((path.clone(), event.clone()));
            }
        }

        let paths: Vec<DocPath> = fresh.iter().map(|(path, _)| path.clone()).collect();
        let mut writer = ChunkedWriter::new(TxnSink::new(txn));
        for (path, event) in fresh {
            writer.upsert(path, event)?;
        }
        writer.finish()?;
        Ok(paths)
    })?;
    Ok(created)
}

fn flush<S: DocumentStore>(
    store: &S,
    pending: &mut Vec<(DocPath, Value)>,
    stats: &mut IngestStats,
    touched: &mut BTreeMap<String, DocPath>,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let created = create_missing(store, pending).context("Failed to write events")?;
    stats.chunks += 1;
    stats.created += created.len();
    stats.skipped += pending.len() - created.len();
    for path in created {
        touched
            .entry(path.collection().to_string())
            .or_insert(path);
    }
    pending.clear();
    Ok(())
}

pub fn execute<S: DocumentStore>(
    store: &S,
    registry: &ProcessorRegistry,
    file: &Path,
    notify: bool,
) -> Result<IngestStats> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );
    let now = SystemClock.now_millis();
    let chunk_size = store.max_batch_writes().max(1);

    let mut stats = IngestStats::default();
    // One notification per touched shard collection is enough.
    let mut touched: BTreeMap<String, DocPath> = BTreeMap::new();
    let mut pending: Vec<(DocPath, Value)> = Vec::with_capacity(chunk_size);
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: IngestRecord = serde_json::from_str(&line)
            .with_context(|| format!("Line {}: not an event record", idx + 1))?;
        let event = record
            .into_event(now)
            .with_context(|| format!("Line {}: invalid event path", idx + 1))?;
        pending.push(event);
        if pending.len() >= chunk_size {
            flush(store, &mut pending, &mut stats, &mut touched)?;
        }
    }
    flush(store, &mut pending, &mut stats, &mut touched)?;

    println!(
        "✓ Wrote {} event(s) in {} chunk(s) across {} collection(s), {} already present",
        stats.created,
        stats.chunks,
        touched.len(),
        stats.skipped
    );

    if !notify {
        println!("Skipped notifications; the stale-event sweep will pick them up");
        return Ok(stats);
    }

    let (mut processed, mut deferred, mut failed) = (0usize, 0usize, 0usize);
    for path in touched.values() {
        for (processor, outcome) in registry.notify(path) {
            match outcome {
                Ok(TriggerOutcome::Processed(_)) => processed += 1,
                Ok(TriggerOutcome::Deferred { .. }) => deferred += 1,
                Err(e) => {
                    failed += 1;
                    eprintln!("  {} failed on {}: {}", processor, path.collection(), e);
                }
            }
        }
    }
    println!(
        "Triggered shards: {} processed, {} deferred, {} failed",
        processed, deferred, failed
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use strata_core::SweepConfig;
    use strata_engine::ShardWorkflow;
    use strata_memory::MemoryStore;
    use strata_projections::ProjectionKind;

    fn referrals(store: &Arc<MemoryStore>) -> ProcessorRegistry {
        strata_projections::build_registry(
            store.clone(),
            &[ProjectionKind::Referrals.default_config()],
            &SweepConfig::default(),
            None,
        )
        .unwrap()
    }

    fn ndjson(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn doc(store: &MemoryStore, path: &str) -> Value {
        store
            .get(&DocPath::parse(path).unwrap())
            .unwrap()
            .map(|d| d.data)
            .unwrap_or(Value::Null)
    }

    #[test]
    fn test_reingest_keeps_processed_events() {
        let store = Arc::new(MemoryStore::new());
        let registry = referrals(&store);
        let file = ndjson(&[r#"{"path": "referrals/abc/events/e1", "data": {"count": 1}}"#]);

        let first = execute(store.as_ref(), &registry, file.path(), true).unwrap();
        assert_eq!((first.created, first.skipped), (1, 0));
        let event = doc(&store, "referrals/abc/events/e1");
        assert_eq!(event["metadata"]["processed"], json!(true));
        assert_eq!(doc(&store, "referrals/abc")["totalReferrals"], json!(1));

        // Redelivery of the same file must not reopen the event.
        let second = execute(store.as_ref(), &registry, file.path(), true).unwrap();
        assert_eq!((second.created, second.skipped), (0, 1));
        assert_eq!(doc(&store, "referrals/abc/events/e1"), event);

        registry
            .get("referrals")
            .unwrap()
            .process("referrals/abc/events")
            .unwrap();
        assert_eq!(doc(&store, "referrals/abc")["totalReferrals"], json!(1));
    }

    #[test]
    fn test_duplicate_lines_create_one_event() {
        let store = Arc::new(MemoryStore::new());
        let registry = referrals(&store);
        let file = ndjson(&[
            r#"{"path": "referrals/abc/events/e1", "data": {"count": 2}}"#,
            "",
            r#"{"path": "referrals/abc/events/e1", "data": {"count": 2}}"#,
            r#"{"path": "referrals/xyz/events/e1", "data": {"count": 5}}"#,
        ]);

        let stats = execute(store.as_ref(), &registry, file.path(), false).unwrap();
        assert_eq!(
            stats,
            IngestStats {
                created: 2,
                skipped: 1,
                chunks: 1
            }
        );
        assert_eq!(
            doc(&store, "referrals/abc/events/e1")["metadata"]["processed"],
            json!(false)
        );
        assert!(doc(&store, "referrals/abc").is_null());
    }

    #[test]
    fn test_record_metadata_defaults() {
        let record: IngestRecord = serde_json::from_str(
            r#"{"path": "referrals/abc/events/e1", "data": {"count": 2},
                "metadata": {"processed": true, "blockNumber": 7}}"#,
        )
        .unwrap();
        let (path, event) = record.into_event(1_000).unwrap();
        assert_eq!(path.as_str(), "referrals/abc/events/e1");
        assert_eq!(
            event,
            json!({
                "data": {"count": 2},
                "metadata": {
                    "id": "e1",
                    "timestamp": 1_000,
                    "updatedAt": 1_000,
                    "processed": false,
                    "blockNumber": 7
                }
            })
        );
    }

    #[test]
    fn test_record_with_bad_path_is_rejected() {
        let record: IngestRecord =
            serde_json::from_str(r#"{"path": "referrals/abc/events", "data": {}}"#).unwrap();
        assert!(record.into_event(0).is_err());
    }
}
