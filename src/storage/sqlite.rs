//! SQLite storage backend

use super::traits::{GraphStore, OpenStore, StorageError, StorageResult};
use crate::graph::{Edge, EdgeId, KnowledgeGraph, Node, NodeContent, NodeId, NodeKind, RelationshipType};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// SQLite-backed graph store
///
/// Tables `nodes` and `edges` mirror the model fields one column each;
/// `edges.source_id`/`target_id` are foreign keys into `nodes.id`. A
/// one-row `graph_metadata` table records when the graph was saved.
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                content_text TEXT,
                content_summary TEXT,
                ontology_tags_json TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at INTEGER NOT NULL,
                source_ref TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                target_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                relationship TEXT NOT NULL,
                base_score REAL NOT NULL,
                is_semantic INTEGER NOT NULL,
                weight REAL NOT NULL,
                confidence REAL NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            CREATE INDEX IF NOT EXISTS idx_edges_relationship ON edges(relationship);

            CREATE TABLE IF NOT EXISTS graph_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                saved_at TEXT NOT NULL,
                total_nodes INTEGER NOT NULL,
                total_edges INTEGER NOT NULL
            );

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// When the stored graph was last saved, if ever
    pub fn saved_at(&self) -> StorageResult<Option<chrono::DateTime<chrono::Utc>>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row("SELECT saved_at FROM graph_metadata WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        raw.map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&chrono::Utc))
                .map_err(|e| corrupt("graph_metadata", e))
        })
        .transpose()
    }

    fn count(&self, table: &'static str) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        usize::try_from(count).map_err(|e| corrupt(table, e))
    }
}

fn corrupt(table: &'static str, reason: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt {
        table,
        reason: reason.to_string(),
    }
}

fn step_to_sql(table: &'static str, step: u64) -> StorageResult<i64> {
    i64::try_from(step).map_err(|e| corrupt(table, e))
}

fn step_from_sql(table: &'static str, step: i64) -> StorageResult<u64> {
    u64::try_from(step).map_err(|e| corrupt(table, e))
}

/// Raw `nodes` row before parsing
type NodeRow = (String, String, Option<String>, Option<String>, String, f64, i64, Option<String>);

/// Raw `edges` row before parsing
type EdgeRow = (String, String, String, String, f64, bool, f64, f64, i64);

fn row_to_node(row: NodeRow) -> StorageResult<Node> {
    let (id, kind, text, summary, tags_json, confidence, created_at, source_ref) = row;
    Ok(Node {
        id: NodeId::from_string(id),
        kind: kind.parse::<NodeKind>().map_err(|e| corrupt("nodes", e))?,
        content: NodeContent { text, summary },
        ontology_tags: serde_json::from_str::<BTreeSet<String>>(&tags_json)?,
        confidence,
        created_at: step_from_sql("nodes", created_at)?,
        source_ref: source_ref.map(NodeId::from_string),
    })
}

fn row_to_edge(row: EdgeRow) -> StorageResult<Edge> {
    let (id, source, target, relationship, base_score, is_semantic, weight, confidence, created_at) =
        row;
    Ok(Edge {
        id: EdgeId::from_string(id),
        source_id: NodeId::from_string(source),
        target_id: NodeId::from_string(target),
        relationship_type: relationship
            .parse::<RelationshipType>()
            .map_err(|e| corrupt("edges", e))?,
        base_score,
        is_semantic,
        weight,
        confidence,
        created_at: step_from_sql("edges", created_at)?,
    })
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    fn save_graph(&self, graph: &KnowledgeGraph) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // Edges first (foreign key safety)
        tx.execute("DELETE FROM edges", [])?;
        tx.execute("DELETE FROM nodes", [])?;

        {
            let mut insert_node = tx.prepare(
                r#"
                INSERT INTO nodes (id, kind, content_text, content_summary, ontology_tags_json,
                                   confidence, created_at, source_ref)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for node in graph.nodes() {
                insert_node.execute(params![
                    node.id.as_str(),
                    node.kind.as_str(),
                    node.content.text,
                    node.content.summary,
                    serde_json::to_string(&node.ontology_tags)?,
                    node.confidence,
                    step_to_sql("nodes", node.created_at)?,
                    node.source_ref.as_ref().map(NodeId::as_str),
                ])?;
            }

            let mut insert_edge = tx.prepare(
                r#"
                INSERT INTO edges (id, source_id, target_id, relationship, base_score,
                                   is_semantic, weight, confidence, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for edge in graph.edges() {
                insert_edge.execute(params![
                    edge.id.as_str(),
                    edge.source_id.as_str(),
                    edge.target_id.as_str(),
                    edge.relationship_type.as_str(),
                    edge.base_score,
                    edge.is_semantic,
                    edge.weight(),
                    edge.confidence,
                    step_to_sql("edges", edge.created_at)?,
                ])?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO graph_metadata (id, saved_at, total_nodes, total_edges)
            VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                saved_at = excluded.saved_at,
                total_nodes = excluded.total_nodes,
                total_edges = excluded.total_edges
            "#,
            params![
                chrono::Utc::now().to_rfc3339(),
                graph.node_count() as i64,
                graph.edge_count() as i64,
            ],
        )?;
        tx.commit()?;

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph saved to sqlite"
        );
        Ok(())
    }

    fn load_graph(&self) -> StorageResult<KnowledgeGraph> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, kind, content_text, content_summary, ontology_tags_json,
                    confidence, created_at, source_ref
             FROM nodes ORDER BY id",
        )?;
        let nodes = stmt
            .query_map([], |row| -> rusqlite::Result<NodeRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .map(|row| row.map_err(StorageError::from).and_then(row_to_node))
            .collect::<StorageResult<Vec<Node>>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, relationship, base_score,
                    is_semantic, weight, confidence, created_at
             FROM edges ORDER BY id",
        )?;
        let edges = stmt
            .query_map([], |row| -> rusqlite::Result<EdgeRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })?
            .map(|row| row.map_err(StorageError::from).and_then(row_to_edge))
            .collect::<StorageResult<Vec<Edge>>>()?;

        Ok(KnowledgeGraph::from_parts(nodes, edges)?)
    }

    fn node_count(&self) -> StorageResult<usize> {
        self.count("nodes")
    }

    fn edge_count(&self) -> StorageResult<usize> {
        self.count("edges")
    }
}
