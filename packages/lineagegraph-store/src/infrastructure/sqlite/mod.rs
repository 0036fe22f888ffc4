//! SQLite adapter for `FieldLineageQuery`
//!
//! Runs the whole depth-limited field walk as one recursive CTE over the
//! `column_lineage` table. Every value reaches SQLite as a bound parameter:
//! `?1` is the `as_of` cutoff (microseconds), `?2` the seed field keys as a
//! JSON array expanded with `json_each`, `?3` the depth.
//!
//! Cycle safety: each walk row carries its path as `|output>input|...` and a
//! pair already present in the path is never appended again.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::domain::{
    ColumnLineageInput, ColumnRelationshipRow, EntityKey, FieldLineageQuery, FieldLineageRequest,
    FieldLink, FieldRef,
};
use crate::{Result, StorageError};

// ═══════════════════════════════════════════════════════════════════════════
// Schema & Queries
// ═══════════════════════════════════════════════════════════════════════════

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS datasets (
    uuid TEXT PRIMARY KEY,
    namespace_name TEXT NOT NULL,
    name TEXT NOT NULL,
    is_primary_alias INTEGER NOT NULL DEFAULT 1,
    UNIQUE (namespace_name, name)
);

CREATE TABLE IF NOT EXISTS dataset_fields (
    uuid TEXT PRIMARY KEY,
    dataset_uuid TEXT NOT NULL REFERENCES datasets (uuid),
    name TEXT NOT NULL,
    type TEXT,
    UNIQUE (dataset_uuid, name)
);

CREATE TABLE IF NOT EXISTS column_lineage (
    output_dataset_version_uuid TEXT NOT NULL,
    output_dataset_field_uuid TEXT NOT NULL REFERENCES dataset_fields (uuid),
    input_dataset_version_uuid TEXT NOT NULL,
    input_dataset_field_uuid TEXT NOT NULL REFERENCES dataset_fields (uuid),
    transformation_description TEXT,
    transformation_type TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (
        output_dataset_version_uuid,
        output_dataset_field_uuid,
        input_dataset_version_uuid,
        input_dataset_field_uuid
    )
);

CREATE INDEX IF NOT EXISTS idx_column_lineage_output
    ON column_lineage (output_dataset_field_uuid, created_at);
CREATE INDEX IF NOT EXISTS idx_column_lineage_input
    ON column_lineage (input_dataset_field_uuid);
"#;

const UPSERT_COLUMN_LINEAGE: &str = r#"
INSERT INTO column_lineage (
    output_dataset_version_uuid, output_dataset_field_uuid,
    input_dataset_version_uuid, input_dataset_field_uuid,
    transformation_description, transformation_type, created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
ON CONFLICT (
    output_dataset_version_uuid, output_dataset_field_uuid,
    input_dataset_version_uuid, input_dataset_field_uuid
) DO UPDATE SET
    transformation_description = excluded.transformation_description,
    transformation_type = excluded.transformation_type,
    updated_at = excluded.updated_at
"#;

/// Walk from seed outputs towards their inputs
const UPSTREAM_WALK: &str = r#"
WITH RECURSIVE
eligible AS (
    SELECT * FROM column_lineage WHERE created_at <= ?1
),
latest AS (
    SELECT output_dataset_field_uuid, MAX(created_at) AS created_at
    FROM eligible
    GROUP BY output_dataset_field_uuid
),
snapshot AS (
    SELECT e.*
    FROM eligible e
    JOIN latest l
      ON l.output_dataset_field_uuid = e.output_dataset_field_uuid
     AND l.created_at = e.created_at
),
visible AS (
    SELECT s.*
    FROM snapshot s
    JOIN dataset_fields fo ON fo.uuid = s.output_dataset_field_uuid
    JOIN datasets dso ON dso.uuid = fo.dataset_uuid AND dso.is_primary_alias = 1
    JOIN dataset_fields fi ON fi.uuid = s.input_dataset_field_uuid
    JOIN datasets dsi ON dsi.uuid = fi.dataset_uuid AND dsi.is_primary_alias = 1
),
walk (output_field, output_version, input_field, input_version, description, kind, depth, path) AS (
    SELECT v.output_dataset_field_uuid, v.output_dataset_version_uuid,
           v.input_dataset_field_uuid, v.input_dataset_version_uuid,
           v.transformation_description, v.transformation_type,
           1,
           '|' || v.output_dataset_field_uuid || '>' || v.input_dataset_field_uuid || '|'
    FROM visible v
    WHERE v.output_dataset_field_uuid IN (SELECT value FROM json_each(?2))
      AND ?3 > 0
    UNION
    SELECT v.output_dataset_field_uuid, v.output_dataset_version_uuid,
           v.input_dataset_field_uuid, v.input_dataset_version_uuid,
           v.transformation_description, v.transformation_type,
           w.depth + 1,
           w.path || v.output_dataset_field_uuid || '>' || v.input_dataset_field_uuid || '|'
    FROM visible v
    JOIN walk w ON v.output_dataset_field_uuid = w.input_field
    WHERE w.depth < ?3
      AND instr(w.path, '|' || v.output_dataset_field_uuid || '>' || v.input_dataset_field_uuid || '|') = 0
)
SELECT DISTINCT
    w.output_field, w.output_version, dso.namespace_name, dso.name, fo.name, fo.type,
    w.input_field, w.input_version, dsi.namespace_name, dsi.name, fi.name,
    w.description, w.kind
FROM walk w
JOIN dataset_fields fo ON fo.uuid = w.output_field
JOIN datasets dso ON dso.uuid = fo.dataset_uuid
JOIN dataset_fields fi ON fi.uuid = w.input_field
JOIN datasets dsi ON dsi.uuid = fi.dataset_uuid
ORDER BY w.output_field, w.output_version, w.input_field, w.input_version
"#;

/// Walk from seed inputs towards the outputs that read them
const DOWNSTREAM_WALK: &str = r#"
WITH RECURSIVE
eligible AS (
    SELECT * FROM column_lineage WHERE created_at <= ?1
),
latest AS (
    SELECT output_dataset_field_uuid, MAX(created_at) AS created_at
    FROM eligible
    GROUP BY output_dataset_field_uuid
),
snapshot AS (
    SELECT e.*
    FROM eligible e
    JOIN latest l
      ON l.output_dataset_field_uuid = e.output_dataset_field_uuid
     AND l.created_at = e.created_at
),
visible AS (
    SELECT s.*
    FROM snapshot s
    JOIN dataset_fields fo ON fo.uuid = s.output_dataset_field_uuid
    JOIN datasets dso ON dso.uuid = fo.dataset_uuid AND dso.is_primary_alias = 1
    JOIN dataset_fields fi ON fi.uuid = s.input_dataset_field_uuid
    JOIN datasets dsi ON dsi.uuid = fi.dataset_uuid AND dsi.is_primary_alias = 1
),
walk (output_field, output_version, input_field, input_version, description, kind, depth, path) AS (
    SELECT v.output_dataset_field_uuid, v.output_dataset_version_uuid,
           v.input_dataset_field_uuid, v.input_dataset_version_uuid,
           v.transformation_description, v.transformation_type,
           1,
           '|' || v.output_dataset_field_uuid || '>' || v.input_dataset_field_uuid || '|'
    FROM visible v
    WHERE v.input_dataset_field_uuid IN (SELECT value FROM json_each(?2))
      AND ?3 > 0
    UNION
    SELECT v.output_dataset_field_uuid, v.output_dataset_version_uuid,
           v.input_dataset_field_uuid, v.input_dataset_version_uuid,
           v.transformation_description, v.transformation_type,
           w.depth + 1,
           w.path || v.output_dataset_field_uuid || '>' || v.input_dataset_field_uuid || '|'
    FROM visible v
    JOIN walk w ON v.input_dataset_field_uuid = w.output_field
    WHERE w.depth < ?3
      AND instr(w.path, '|' || v.output_dataset_field_uuid || '>' || v.input_dataset_field_uuid || '|') = 0
)
SELECT DISTINCT
    w.output_field, w.output_version, dso.namespace_name, dso.name, fo.name, fo.type,
    w.input_field, w.input_version, dsi.namespace_name, dsi.name, fi.name,
    w.description, w.kind
FROM walk w
JOIN dataset_fields fo ON fo.uuid = w.output_field
JOIN datasets dso ON dso.uuid = fo.dataset_uuid
JOIN dataset_fields fi ON fi.uuid = w.input_field
JOIN datasets dsi ON dsi.uuid = fi.dataset_uuid
ORDER BY w.output_field, w.output_version, w.input_field, w.input_version
"#;

// ═══════════════════════════════════════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════════════════════════════════════

/// One `output <- input` edge as read from SQLite, before key parsing
struct RawEdge {
    output_field: String,
    output_version: String,
    output_namespace: String,
    output_dataset: String,
    output_name: String,
    output_type: Option<String>,
    input_field: String,
    input_version: String,
    input_namespace: String,
    input_dataset: String,
    input_name: String,
    description: Option<String>,
    kind: Option<String>,
}

impl RawEdge {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            output_field: row.get(0)?,
            output_version: row.get(1)?,
            output_namespace: row.get(2)?,
            output_dataset: row.get(3)?,
            output_name: row.get(4)?,
            output_type: row.get(5)?,
            input_field: row.get(6)?,
            input_version: row.get(7)?,
            input_namespace: row.get(8)?,
            input_dataset: row.get(9)?,
            input_name: row.get(10)?,
            description: row.get(11)?,
            kind: row.get(12)?,
        })
    }
}

/// Group edges into one row per output field version
fn group_edges(edges: Vec<RawEdge>) -> Result<Vec<ColumnRelationshipRow>> {
    let mut rows: BTreeMap<(EntityKey, EntityKey), ColumnRelationshipRow> = BTreeMap::new();
    for edge in edges {
        let output_key: EntityKey = edge.output_field.parse()?;
        let output_version: EntityKey = edge.output_version.parse()?;
        let link = FieldLink {
            field: FieldRef {
                key: edge.input_field.parse()?,
                namespace: edge.input_namespace,
                dataset: edge.input_dataset,
                field: edge.input_name,
                dataset_version: Some(edge.input_version.parse()?),
            },
            transformation_description: edge.description,
            transformation_type: edge.kind,
        };
        let row = rows.entry((output_key, output_version)).or_insert_with(|| {
            ColumnRelationshipRow::new(
                FieldRef {
                    key: output_key,
                    namespace: edge.output_namespace,
                    dataset: edge.output_dataset,
                    field: edge.output_name,
                    dataset_version: Some(output_version),
                },
                edge.output_type,
            )
        });
        if !row.input_fields.contains(&link) {
            row.input_fields.push(link);
        }
    }
    Ok(rows
        .into_values()
        .map(|mut row| {
            row.input_fields.sort();
            row
        })
        .collect())
}

fn run_walk(
    conn: &Connection,
    sql: &str,
    as_of: i64,
    seeds: &str,
    depth: i64,
) -> Result<Vec<RawEdge>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let edges = stmt
        .query_map(params![as_of, seeds, depth], RawEdge::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

// ═══════════════════════════════════════════════════════════════════════════
// SqliteFieldLineage
// ═══════════════════════════════════════════════════════════════════════════

/// Recursive-CTE field traversal over SQLite
///
/// The connection is shared behind a mutex and every query runs on the
/// blocking pool.
///
/// # Examples
///
/// ```rust,ignore
/// let sqlite = SqliteFieldLineage::open_in_memory()?;
/// sqlite.insert_dataset(orders, "ns", "orders", true)?;
/// sqlite.insert_field(total, orders, "total", Some("DECIMAL"))?;
/// let rows = sqlite.multi_hop_field_lineage(&request).await?;
/// ```
#[derive(Clone)]
pub struct SqliteFieldLineage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFieldLineage {
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path.as_ref())?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Ingestion
    // ═══════════════════════════════════════════════════════════════════════

    pub fn insert_dataset(
        &self,
        key: EntityKey,
        namespace: &str,
        name: &str,
        is_primary_alias: bool,
    ) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO datasets (uuid, namespace_name, name, is_primary_alias) VALUES (?1, ?2, ?3, ?4)",
            params![key.to_string(), namespace, name, is_primary_alias],
        )?;
        Ok(())
    }

    pub fn insert_field(
        &self,
        key: EntityKey,
        dataset: EntityKey,
        name: &str,
        field_type: Option<&str>,
    ) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO dataset_fields (uuid, dataset_uuid, name, type) VALUES (?1, ?2, ?3, ?4)",
            params![key.to_string(), dataset.to_string(), name, field_type],
        )?;
        Ok(())
    }

    /// Upsert column-lineage facts for one output field
    ///
    /// Re-recording an existing key keeps `created_at` and refreshes the
    /// transformation and `updated_at`.
    pub fn record_column_lineage(
        &self,
        output_version: EntityKey,
        output_field: EntityKey,
        inputs: &[ColumnLineageInput],
        transformation_description: Option<&str>,
        transformation_type: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_COLUMN_LINEAGE)?;
            for input in inputs {
                stmt.execute(params![
                    output_version.to_string(),
                    output_field.to_string(),
                    input.dataset_version.to_string(),
                    input.field.to_string(),
                    transformation_description,
                    transformation_type,
                    at.timestamp_micros(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn column_lineage_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM column_lineage", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| StorageError::database(format!("bad count: {}", e)))
    }
}

#[async_trait]
impl FieldLineageQuery for SqliteFieldLineage {
    fn strategy_name(&self) -> &'static str {
        "sqlite recursive query"
    }

    async fn multi_hop_field_lineage(
        &self,
        request: &FieldLineageRequest,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        let seeds: Vec<String> = request.seeds.iter().map(|k| k.to_string()).collect();
        let seeds = serde_json::to_string(&seeds)?;
        let as_of = request.as_of.timestamp_micros();
        let depth = i64::from(request.depth);
        let with_downstream = request.with_downstream;
        let conn = Arc::clone(&self.conn);

        let edges = tokio::task::spawn_blocking(move || -> Result<Vec<RawEdge>> {
            let conn = conn.lock();
            let mut edges = run_walk(&conn, UPSTREAM_WALK, as_of, &seeds, depth)?;
            if with_downstream {
                edges.extend(run_walk(&conn, DOWNSTREAM_WALK, as_of, &seeds, depth)?);
            }
            Ok(edges)
        })
        .await
        .map_err(|e| StorageError::database(format!("SQLite task failed: {}", e)).with_source(e))??;

        debug!(
            seeds = request.seeds.len(),
            depth = request.depth,
            edges = edges.len(),
            "sqlite recursive field walk finished"
        );
        group_edges(edges)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
