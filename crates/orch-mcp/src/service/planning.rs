#![forbid(unsafe_code)]
//! Planning graph flows: bootstrap, slice generation, replan, rollup.

use super::{marshal_string_slice, to_value, Service};
use crate::error::ServiceError;
use crate::service::inputs::*;
use orch_storage::{GraphEdgeCreateArgs, GraphNodeCreateArgs, NodeSnapshotCreateArgs};
use serde_json::{json, Value};

impl Service {
    pub(crate) fn plan_bootstrap(
        &mut self,
        input: PlanBootstrapInput,
    ) -> Result<Value, ServiceError> {
        if input.initiative_title.is_empty() {
            return Err(ServiceError::validation("initiative_title is required"));
        }
        if input.plan_title.is_empty() {
            return Err(ServiceError::validation("plan_title is required"));
        }

        let initiative = self.store_mut().create_graph_node(GraphNodeCreateArgs {
            node_type: "initiative".to_string(),
            facet: "planning".to_string(),
            title: input.initiative_title,
            status: "in_progress".to_string(),
            priority: input.priority,
            owner_session_id: input.owner_session_id,
            summary: input.summary,
            ..GraphNodeCreateArgs::default()
        })?;

        let plan_node = self.store_mut().create_graph_node(GraphNodeCreateArgs {
            node_type: "plan".to_string(),
            facet: "planning".to_string(),
            title: input.plan_title,
            status: "todo".to_string(),
            priority: input.priority,
            parent_id: Some(initiative.id),
            owner_session_id: input.owner_session_id,
            ..GraphNodeCreateArgs::default()
        })?;

        let edge = self.store_mut().create_graph_edge(GraphEdgeCreateArgs {
            from_node_id: initiative.id,
            to_node_id: plan_node.id,
            edge_type: "contains".to_string(),
        })?;

        Ok(json!({
            "initiative": initiative,
            "plan": plan_node,
            "edge": edge,
        }))
    }

    pub(crate) fn plan_slice_generate(
        &mut self,
        input: PlanSliceGenerateInput,
    ) -> Result<Value, ServiceError> {
        if input.plan_node_id <= 0 {
            return Err(ServiceError::validation("plan_node_id is required"));
        }
        if input.slice_specs.is_empty() {
            return Err(ServiceError::validation("slice_specs is required"));
        }

        let mut created_slices = Vec::with_capacity(input.slice_specs.len());
        let mut created_edges = Vec::with_capacity(input.slice_specs.len());
        for spec in &input.slice_specs {
            if spec.title.is_empty() {
                return Err(ServiceError::validation("slice_specs[].title is required"));
            }
            let token_estimate = (spec.token_estimate > 0).then_some(spec.token_estimate);

            let slice_node = self.store_mut().create_graph_node(GraphNodeCreateArgs {
                node_type: "slice".to_string(),
                facet: "planning".to_string(),
                title: spec.title.clone(),
                status: "todo".to_string(),
                priority: spec.priority,
                parent_id: Some(input.plan_node_id),
                owner_session_id: input.owner_session_id,
                token_estimate,
                affected_files_json: marshal_string_slice(&spec.affected_files),
                summary: spec.summary.clone(),
                ..GraphNodeCreateArgs::default()
            })?;

            let edge = self.store_mut().create_graph_edge(GraphEdgeCreateArgs {
                from_node_id: input.plan_node_id,
                to_node_id: slice_node.id,
                edge_type: "contains".to_string(),
            })?;

            created_slices.push(slice_node);
            created_edges.push(edge);
        }

        Ok(json!({
            "plan_node_id": input.plan_node_id,
            "slices": created_slices,
            "edges": created_edges,
        }))
    }

    pub(crate) fn plan_slice_replan(
        &mut self,
        input: PlanSliceReplanInput,
    ) -> Result<Value, ServiceError> {
        if input.node_id <= 0 {
            return Err(ServiceError::validation("node_id is required"));
        }
        if input.reason.is_empty() {
            return Err(ServiceError::validation("reason is required"));
        }
        to_value(self.store_mut().create_node_snapshot(NodeSnapshotCreateArgs {
            node_id: input.node_id,
            snapshot_type: "replan".to_string(),
            summary: input.reason,
            affected_files_json: marshal_string_slice(&input.affected_files),
            next_action: input.next_action,
        })?)
    }

    /// Rollup: write the snapshot, promote the node to review, and include
    /// the child-status preview.
    pub(crate) fn plan_rollup_submit(
        &mut self,
        input: PlanRollupSubmitInput,
    ) -> Result<Value, ServiceError> {
        if input.node_id <= 0 {
            return Err(ServiceError::validation("node_id is required"));
        }
        let snapshot = self.store_mut().create_node_snapshot(NodeSnapshotCreateArgs {
            node_id: input.node_id,
            snapshot_type: "rollup".to_string(),
            summary: input.summary,
            affected_files_json: marshal_string_slice(&input.affected_files),
            next_action: input.next_action,
        })?;

        let node = self
            .store_mut()
            .update_graph_node_approval(input.node_id, "pending", "in_review")?;

        let preview = self.store().rollup_preview(input.node_id).map_err(|err| {
            ServiceError::Internal(format!(
                "rollup snapshot created but preview failed: {err}"
            ))
        })?;

        Ok(json!({
            "snapshot": snapshot,
            "node": node,
            "preview": preview,
        }))
    }
}
