#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::mirror::bump_version_tx;
use crate::support::{now_timestamp, nullable_text};
use crate::types::{
    GraphEdge, GraphEdgeCreateArgs, GraphNode, GraphNodeCreateArgs, GraphNodeFilter,
    NodeChecklistItem, NodeChecklistUpsertArgs, NodeSnapshot, NodeSnapshotCreateArgs, PlanningRule,
    RollupPreview,
};
use crate::SqliteStore;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::collections::BTreeMap;

const NODE_COLUMNS: &str = "id, node_type, facet, title, status, priority, parent_id, worktree_id, owner_session_id, summary, risk_level, token_estimate, affected_files_json, approval_state, created_at, updated_at";

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<GraphNode> {
    Ok(GraphNode {
        id: row.get(0)?,
        node_type: row.get(1)?,
        facet: row.get(2)?,
        title: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        parent_id: row.get(6)?,
        worktree_id: row.get(7)?,
        owner_session_id: row.get(8)?,
        summary: row.get(9)?,
        risk_level: row.get(10)?,
        token_estimate: row.get(11)?,
        affected_files_json: row.get(12)?,
        approval_state: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl SqliteStore {
    pub fn create_graph_node(
        &mut self,
        args: GraphNodeCreateArgs,
    ) -> Result<GraphNode, StoreError> {
        if args.node_type.trim().is_empty() {
            return Err(StoreError::InvalidInput("node_type is required"));
        }
        if args.title.trim().is_empty() {
            return Err(StoreError::InvalidInput("title is required"));
        }
        let mut facet = args.facet.trim().to_string();
        if facet.is_empty() {
            facet = "planning".to_string();
        }
        let mut status = args.status.trim().to_string();
        if status.is_empty() {
            status = "todo".to_string();
        }
        let mut approval_state = args.approval_state.trim().to_string();
        if approval_state.is_empty() {
            approval_state = "none".to_string();
        }

        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        tx.execute(
            "INSERT INTO graph_nodes(node_type, facet, title, status, priority, parent_id, worktree_id, owner_session_id, summary, risk_level, token_estimate, affected_files_json, approval_state, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                args.node_type,
                facet,
                args.title,
                status,
                args.priority,
                args.parent_id,
                args.worktree_id,
                args.owner_session_id,
                nullable_text(&args.summary),
                args.risk_level,
                args.token_estimate,
                nullable_text(&args.affected_files_json),
                approval_state,
                now,
                now
            ],
        )?;
        let node_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let node = tx.query_row(
            &format!("SELECT {NODE_COLUMNS} FROM graph_nodes WHERE id = ?1"),
            params![node_id],
            node_from_row,
        )?;
        tx.commit()?;
        Ok(node)
    }

    pub fn list_graph_nodes(&self, filter: GraphNodeFilter) -> Result<Vec<GraphNode>, StoreError> {
        let mut sql = format!("SELECT {NODE_COLUMNS} FROM graph_nodes WHERE 1=1");
        let mut bind: Vec<SqlValue> = Vec::new();

        if !filter.node_type.trim().is_empty() {
            sql.push_str(" AND node_type = ?");
            bind.push(SqlValue::Text(filter.node_type.trim().to_string()));
        }
        if !filter.facet.trim().is_empty() {
            sql.push_str(" AND facet = ?");
            bind.push(SqlValue::Text(filter.facet.trim().to_string()));
        }
        if !filter.status.trim().is_empty() {
            sql.push_str(" AND status = ?");
            bind.push(SqlValue::Text(filter.status.trim().to_string()));
        }
        if let Some(parent_id) = filter.parent_id {
            sql.push_str(" AND parent_id = ?");
            bind.push(SqlValue::Integer(parent_id));
        }
        sql.push_str(" ORDER BY priority DESC, updated_at ASC, id ASC");

        let mut stmt = self.conn().prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind))?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(node_from_row(row)?);
        }
        Ok(nodes)
    }

    pub fn get_graph_node(&self, node_id: i64) -> Result<GraphNode, StoreError> {
        self.conn()
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM graph_nodes WHERE id = ?1"),
                params![node_id],
                node_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "graph node",
                id: node_id,
            })
    }

    /// Transition approval state, optionally forcing the node status in the
    /// same transaction (rollup approve ⇒ done, reject ⇒ blocked).
    pub fn update_graph_node_approval(
        &mut self,
        node_id: i64,
        approval_state: &str,
        status: &str,
    ) -> Result<GraphNode, StoreError> {
        if approval_state.trim().is_empty() {
            return Err(StoreError::InvalidInput("approval_state is required"));
        }

        let tx = self.conn_mut().transaction()?;
        let changed = if status.trim().is_empty() {
            tx.execute(
                "UPDATE graph_nodes
                    SET approval_state = ?1, updated_at = ?2
                  WHERE id = ?3",
                params![approval_state.trim(), now_timestamp(), node_id],
            )?
        } else {
            tx.execute(
                "UPDATE graph_nodes
                    SET approval_state = ?1, status = ?2, updated_at = ?3
                  WHERE id = ?4",
                params![approval_state.trim(), status.trim(), now_timestamp(), node_id],
            )?
        };
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "graph node",
                id: node_id,
            });
        }
        bump_version_tx(&tx)?;
        let node = tx.query_row(
            &format!("SELECT {NODE_COLUMNS} FROM graph_nodes WHERE id = ?1"),
            params![node_id],
            node_from_row,
        )?;
        tx.commit()?;
        Ok(node)
    }

    pub fn create_graph_edge(&mut self, args: GraphEdgeCreateArgs) -> Result<GraphEdge, StoreError> {
        if args.from_node_id <= 0 || args.to_node_id <= 0 {
            return Err(StoreError::InvalidInput(
                "from_node_id and to_node_id are required",
            ));
        }
        let edge_type = args.edge_type.trim().to_string();
        if edge_type.is_empty() {
            return Err(StoreError::InvalidInput("edge_type is required"));
        }

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO graph_edges(from_node_id, to_node_id, edge_type, created_at)
             VALUES(?1, ?2, ?3, ?4)",
            params![args.from_node_id, args.to_node_id, edge_type, now_timestamp()],
        )?;
        let edge_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let edge = tx.query_row(
            "SELECT id, from_node_id, to_node_id, edge_type, created_at
               FROM graph_edges
              WHERE id = ?1",
            params![edge_id],
            |row| {
                Ok(GraphEdge {
                    id: row.get(0)?,
                    from_node_id: row.get(1)?,
                    to_node_id: row.get(2)?,
                    edge_type: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(edge)
    }

    /// Upsert keyed on (node, order_no, facet) inside one transaction.
    pub fn upsert_node_checklist_item(
        &mut self,
        mut args: NodeChecklistUpsertArgs,
    ) -> Result<NodeChecklistItem, StoreError> {
        if args.node_id <= 0 {
            return Err(StoreError::InvalidInput("node_id is required"));
        }
        if args.item_text.trim().is_empty() {
            return Err(StoreError::InvalidInput("item_text is required"));
        }
        let mut status = args.status.trim().to_string();
        if status.is_empty() {
            status = "todo".to_string();
        }
        if args.order_no <= 0 {
            args.order_no = 1;
        }
        let mut facet = args.facet.trim().to_string();
        if facet.is_empty() {
            facet = "planning".to_string();
        }

        let tx = self.conn_mut().transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id
                   FROM node_checklists
                  WHERE node_id = ?1 AND order_no = ?2 AND facet = ?3
                  LIMIT 1",
                params![args.node_id, args.order_no, facet],
                |row| row.get(0),
            )
            .optional()?;

        let checklist_id = match existing {
            Some(checklist_id) => {
                tx.execute(
                    "UPDATE node_checklists
                        SET item_text = ?1, status = ?2, updated_at = ?3
                      WHERE id = ?4",
                    params![args.item_text, status, now_timestamp(), checklist_id],
                )?;
                checklist_id
            }
            None => {
                tx.execute(
                    "INSERT INTO node_checklists(node_id, item_text, status, order_no, facet, created_at, updated_at)
                     VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        args.node_id,
                        args.item_text,
                        status,
                        args.order_no,
                        facet,
                        now_timestamp(),
                        now_timestamp()
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        bump_version_tx(&tx)?;
        let item = tx.query_row(
            "SELECT id, node_id, item_text, status, order_no, facet, created_at, updated_at
               FROM node_checklists
              WHERE id = ?1",
            params![checklist_id],
            |row| {
                Ok(NodeChecklistItem {
                    id: row.get(0)?,
                    node_id: row.get(1)?,
                    item_text: row.get(2)?,
                    status: row.get(3)?,
                    order_no: row.get(4)?,
                    facet: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(item)
    }

    /// Snapshots are append-only.
    pub fn create_node_snapshot(
        &mut self,
        args: NodeSnapshotCreateArgs,
    ) -> Result<NodeSnapshot, StoreError> {
        if args.node_id <= 0 {
            return Err(StoreError::InvalidInput("node_id is required"));
        }
        if args.snapshot_type.trim().is_empty() {
            return Err(StoreError::InvalidInput("snapshot_type is required"));
        }

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO node_snapshots(node_id, snapshot_type, summary, affected_files_json, next_action, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                args.node_id,
                args.snapshot_type,
                nullable_text(&args.summary),
                nullable_text(&args.affected_files_json),
                nullable_text(&args.next_action),
                now_timestamp()
            ],
        )?;
        let snapshot_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let snapshot = tx.query_row(
            "SELECT id, node_id, snapshot_type, summary, affected_files_json, next_action, created_at
               FROM node_snapshots
              WHERE id = ?1",
            params![snapshot_id],
            |row| {
                Ok(NodeSnapshot {
                    id: row.get(0)?,
                    node_id: row.get(1)?,
                    snapshot_type: row.get(2)?,
                    summary: row.get(3)?,
                    affected_files_json: row.get(4)?,
                    next_action: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(snapshot)
    }

    pub fn planning_rule(&self) -> Result<PlanningRule, StoreError> {
        Ok(self.conn().query_row(
            "SELECT max_token_per_slice, max_files_per_slice, replan_triggers_json, approval_policy, updated_at
               FROM planning_rules
              WHERE id = 1",
            [],
            |row| {
                Ok(PlanningRule {
                    max_token_per_slice: row.get(0)?,
                    max_files_per_slice: row.get(1)?,
                    replan_triggers_json: row.get(2)?,
                    approval_policy: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )?)
    }

    /// Child status counts under a parent node, plus the child rows.
    pub fn rollup_preview(&self, parent_node_id: i64) -> Result<RollupPreview, StoreError> {
        let children = self.list_graph_nodes(GraphNodeFilter {
            parent_id: Some(parent_node_id),
            ..GraphNodeFilter::default()
        })?;

        let mut status_counts: BTreeMap<String, i64> = BTreeMap::new();
        for child in &children {
            *status_counts.entry(child.status.clone()).or_insert(0) += 1;
        }

        Ok(RollupPreview {
            parent_node_id,
            child_count: children.len(),
            status_counts,
            children,
        })
    }
}
