//! Lineage fixtures

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lineagegraph_store::{ColumnLineageInput, EntityKey, InMemoryLineageStore, RunState};

pub const NS: &str = "warehouse";

/// Fixed clock so snapshots are reproducible
pub fn t(minutes: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default() + Duration::minutes(minutes)
}

pub fn input(dataset_version: EntityKey, field: EntityKey) -> ColumnLineageInput {
    ColumnLineageInput {
        dataset_version,
        field,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Column fixtures
// ═══════════════════════════════════════════════════════════════════════════

/// `orders.total <- line_items.price <- raw_events.amount <- source.value`
///
/// Every dataset has one version recorded at `t(0)`.
pub struct ColumnChain {
    pub store: Arc<InMemoryLineageStore>,
    pub datasets: [EntityKey; 4],
    pub versions: [EntityKey; 4],
    pub value: EntityKey,
    pub amount: EntityKey,
    pub price: EntityKey,
    pub total: EntityKey,
}

pub fn column_chain() -> ColumnChain {
    let store = Arc::new(InMemoryLineageStore::new());
    let source = store.add_dataset(NS, "source");
    let raw = store.add_dataset(NS, "raw_events");
    let items = store.add_dataset(NS, "line_items");
    let orders = store.add_dataset(NS, "orders");

    let value = store.add_field(source, "value", Some("DECIMAL")).unwrap();
    let amount = store.add_field(raw, "amount", Some("DECIMAL")).unwrap();
    let price = store.add_field(items, "price", Some("DECIMAL")).unwrap();
    let total = store.add_field(orders, "total", Some("DECIMAL")).unwrap();

    let datasets = [source, raw, items, orders];
    let versions = datasets.map(|d| store.add_dataset_version(d, None, t(0)).unwrap());
    let [v_source, v_raw, v_items, v_orders] = versions;

    let links = [
        (v_raw, amount, v_source, value, "cast", "DIRECT"),
        (v_items, price, v_raw, amount, "identity", "DIRECT"),
        (v_orders, total, v_items, price, "sum", "AGGREGATION"),
    ];
    for (version, field, input_version, input_field, description, kind) in links {
        store
            .record_column_lineage(
                version,
                field,
                &[input(input_version, input_field)],
                Some(description),
                Some(kind),
                t(0),
            )
            .unwrap();
    }

    ColumnChain {
        store,
        datasets,
        versions,
        value,
        amount,
        price,
        total,
    }
}

/// `a.x <- c.x <- b.x <- a.x`
pub struct ColumnCycle {
    pub store: Arc<InMemoryLineageStore>,
    pub fields: [EntityKey; 3],
}

pub fn column_cycle() -> ColumnCycle {
    let store = Arc::new(InMemoryLineageStore::new());
    let datasets = ["a", "b", "c"].map(|name| store.add_dataset(NS, name));
    let fields = datasets.map(|d| store.add_field(d, "x", Some("INT")).unwrap());
    let versions = datasets.map(|d| store.add_dataset_version(d, None, t(0)).unwrap());

    // b <- a, c <- b, a <- c
    for (out, inp) in [(1, 0), (2, 1), (0, 2)] {
        store
            .record_column_lineage(
                versions[out],
                fields[out],
                &[input(versions[inp], fields[inp])],
                Some("copy"),
                None,
                t(0),
            )
            .unwrap();
    }
    ColumnCycle { store, fields }
}

/// `layers` datasets named `layer_<n>` with `width` fields `f<i>` each
///
/// Every field is derived from every field of the previous layer, so the
/// number of distinct paths grows as `width ^ layers`.
pub struct LayeredFields {
    pub store: Arc<InMemoryLineageStore>,
    pub fields: Vec<Vec<EntityKey>>,
}

impl LayeredFields {
    pub fn field_count(&self) -> usize {
        self.fields.iter().map(Vec::len).sum()
    }
}

pub fn layered_fields(layers: usize, width: usize) -> LayeredFields {
    let store = Arc::new(InMemoryLineageStore::new());
    let mut fields: Vec<Vec<EntityKey>> = Vec::with_capacity(layers);
    let mut previous: Vec<ColumnLineageInput> = Vec::new();

    for layer in 0..layers {
        let dataset = store.add_dataset(NS, &format!("layer_{}", layer));
        let layer_fields: Vec<EntityKey> = (0..width)
            .map(|i| store.add_field(dataset, &format!("f{}", i), Some("INT")).unwrap())
            .collect();
        let version = store.add_dataset_version(dataset, None, t(0)).unwrap();
        if !previous.is_empty() {
            for field in &layer_fields {
                store
                    .record_column_lineage(version, *field, &previous, None, None, t(0))
                    .unwrap();
            }
        }
        previous = layer_fields.iter().map(|f| input(version, *f)).collect();
        fields.push(layer_fields);
    }
    LayeredFields { store, fields }
}

// ═══════════════════════════════════════════════════════════════════════════
// Job fixtures
// ═══════════════════════════════════════════════════════════════════════════

/// ```text
/// source_db -> ingest -> raw -> clean -> cleaned -> report -> report_out
///                                               \-> audit  -> audit_log
/// ```
///
/// `cleaned` has two consumers, so it is a fan-out boundary at threshold 1.
/// `lonely` is a dataset no job touches.
pub struct JobPipeline {
    pub store: Arc<InMemoryLineageStore>,
    pub ingest: EntityKey,
    pub clean: EntityKey,
    pub report: EntityKey,
    pub audit: EntityKey,
    pub raw: EntityKey,
    pub cleaned: EntityKey,
}

pub fn job_pipeline() -> JobPipeline {
    let store = Arc::new(InMemoryLineageStore::new());
    let source_db = store.add_dataset(NS, "source_db");
    let raw = store.add_dataset(NS, "raw");
    let cleaned = store.add_dataset(NS, "cleaned");
    let report_out = store.add_dataset(NS, "report_out");
    let audit_log = store.add_dataset(NS, "audit_log");
    store.add_dataset(NS, "lonely");

    let ingest = store.add_job(NS, "ingest", &[source_db], &[raw]).unwrap();
    let clean = store.add_job(NS, "clean", &[raw], &[cleaned]).unwrap();
    let report = store.add_job(NS, "report", &[cleaned], &[report_out]).unwrap();
    let audit = store.add_job(NS, "audit", &[cleaned], &[audit_log]).unwrap();

    JobPipeline {
        store,
        ingest,
        clean,
        report,
        audit,
        raw,
        cleaned,
    }
}

/// Runs along the pipeline: ingest -> clean -> report, each reading the
/// version the previous one produced. Returns the run keys in that order.
pub fn record_pipeline_runs(pipeline: &JobPipeline) -> [EntityKey; 3] {
    let store = &pipeline.store;
    let ingest_run = store
        .add_run(pipeline.ingest, RunState::Completed, &[], t(1))
        .unwrap();
    let raw_v = store.add_dataset_version(pipeline.raw, Some(ingest_run), t(2)).unwrap();
    let clean_run = store
        .add_run(pipeline.clean, RunState::Completed, &[raw_v], t(3))
        .unwrap();
    let cleaned_v = store
        .add_dataset_version(pipeline.cleaned, Some(clean_run), t(4))
        .unwrap();
    let report_run = store
        .add_run(pipeline.report, RunState::Running, &[cleaned_v], t(5))
        .unwrap();
    [ingest_run, clean_run, report_run]
}
