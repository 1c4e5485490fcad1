#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::mirror::bump_version_tx;
use crate::support::{now_timestamp, nullable_text};
use crate::types::{
    CaseBeginArgs, CaseCompleteArgs, Checkpoint, ResumeState, Step, StepCheckArgs, Task,
    TaskCreateArgs, TaskFilter,
};
use crate::SqliteStore;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, Transaction};

const TASK_COLUMNS: &str = "id, level, parent_id, title, status, priority, assignee_session, input_contract, fixtures, next_action, created_at, updated_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        level: row.get(1)?,
        parent_id: row.get(2)?,
        title: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        assignee_session: row.get(6)?,
        input_contract: row.get(7)?,
        fixtures: row.get(8)?,
        next_action: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn checkpoint_from_row(row: &Row<'_>) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        id: row.get(0)?,
        task_id: row.get(1)?,
        step_title: row.get(2)?,
        snapshot: row.get(3)?,
        recorded_at: row.get(4)?,
    })
}

fn get_task_tx(tx: &Transaction<'_>, task_id: i64) -> Result<Task, StoreError> {
    tx.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        params![task_id],
        task_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "task",
        id: task_id,
    })
}

fn insert_checkpoint_tx(
    tx: &Transaction<'_>,
    task_id: i64,
    step_title: &str,
    snapshot_json: &str,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO checkpoints(task_id, step_title, snapshot_json, created_at)
         VALUES(?1, ?2, ?3, ?4)",
        params![task_id, step_title, snapshot_json, now_timestamp()],
    )?;
    Ok(())
}

impl SqliteStore {
    pub fn create_task(&mut self, args: TaskCreateArgs) -> Result<Task, StoreError> {
        let level = args.level.trim().to_string();
        if level.is_empty() {
            return Err(StoreError::InvalidInput("level is required"));
        }
        if args.title.trim().is_empty() {
            return Err(StoreError::InvalidInput("title is required"));
        }

        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        tx.execute(
            "INSERT INTO tasks(level, parent_id, title, status, priority, assignee_session, created_at, updated_at)
             VALUES(?1, ?2, ?3, 'todo', ?4, ?5, ?6, ?7)",
            params![
                level,
                args.parent_id,
                args.title,
                args.priority,
                nullable_text(&args.assignee_session),
                now,
                now
            ],
        )?;
        let task_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let task = get_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    pub fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
        let mut bind: Vec<SqlValue> = Vec::new();

        if !filter.level.trim().is_empty() {
            sql.push_str(" AND level = ?");
            bind.push(SqlValue::Text(filter.level.trim().to_string()));
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
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(task_from_row(row)?);
        }
        Ok(tasks)
    }

    pub fn get_task(&self, task_id: i64) -> Result<Task, StoreError> {
        self.conn()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                task_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "task",
                id: task_id,
            })
    }

    /// Transition a case task to `in_progress`, record its input contract and
    /// fixtures, and append a `case.begin` checkpoint.
    pub fn begin_case(&mut self, args: CaseBeginArgs) -> Result<Task, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        let changed = tx.execute(
            "UPDATE tasks
                SET status = 'in_progress',
                    input_contract = ?1,
                    fixtures = ?2,
                    updated_at = ?3
              WHERE id = ?4 AND level = 'case'",
            params![args.input_contract, args.fixtures_json, now, args.task_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "case task",
                id: args.task_id,
            });
        }
        insert_checkpoint_tx(&tx, args.task_id, "case.begin", &args.snapshot_json)?;
        bump_version_tx(&tx)?;
        let task = get_task_tx(&tx, args.task_id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Append an evidence step and a matching checkpoint to a case task.
    pub fn add_step_check(&mut self, args: StepCheckArgs) -> Result<Step, StoreError> {
        if args.step_title.trim().is_empty() {
            return Err(StoreError::InvalidInput("step_title is required"));
        }

        let tx = self.conn_mut().transaction()?;
        let next_order_no: i64 = tx.query_row(
            "SELECT COALESCE(MAX(order_no), 0) + 1 FROM steps WHERE task_id = ?1",
            params![args.task_id],
            |row| row.get(0),
        )?;

        let now = now_timestamp();
        tx.execute(
            "INSERT INTO steps(task_id, title, status, evidence_json, order_no, created_at)
             VALUES(?1, ?2, 'done', ?3, ?4, ?5)",
            params![
                args.task_id,
                args.step_title,
                args.evidence_json,
                next_order_no,
                now
            ],
        )?;
        let step_id = tx.last_insert_rowid();
        insert_checkpoint_tx(&tx, args.task_id, &args.step_title, &args.snapshot_json)?;
        bump_version_tx(&tx)?;
        tx.commit()?;

        Ok(Step {
            id: step_id,
            task_id: args.task_id,
            title: args.step_title,
            status: "done".to_string(),
            evidence: args.evidence_json,
            order_no: next_order_no,
            recorded_at: now,
        })
    }

    pub fn complete_case(&mut self, args: CaseCompleteArgs) -> Result<Task, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        let changed = tx.execute(
            "UPDATE tasks
                SET status = 'done',
                    next_action = ?1,
                    updated_at = ?2
              WHERE id = ?3 AND level = 'case'",
            params![nullable_text(&args.next_action), now, args.task_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "case task",
                id: args.task_id,
            });
        }
        insert_checkpoint_tx(&tx, args.task_id, "case.complete", &args.snapshot_json)?;
        bump_version_tx(&tx)?;
        let task = get_task_tx(&tx, args.task_id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Next case to resume: lowest rank of (in_progress < blocked < todo),
    /// then highest priority, then oldest update; paired with its latest
    /// checkpoint.
    pub fn resume_next_case(&self) -> Result<ResumeState, StoreError> {
        let task = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS}
                       FROM tasks
                      WHERE level = 'case' AND status IN ('in_progress', 'blocked', 'todo')
                      ORDER BY
                        CASE status
                            WHEN 'in_progress' THEN 0
                            WHEN 'blocked' THEN 1
                            ELSE 2
                        END,
                        priority DESC,
                        updated_at ASC
                      LIMIT 1"
                ),
                [],
                task_from_row,
            )
            .optional()?;

        let Some(task) = task else {
            return Ok(ResumeState::default());
        };

        let checkpoint = self.latest_checkpoint(task.id)?;
        Ok(ResumeState {
            task: Some(task),
            checkpoint,
        })
    }

    pub fn latest_checkpoint(&self, task_id: i64) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, task_id, step_title, snapshot_json, created_at
                   FROM checkpoints
                  WHERE task_id = ?1
                  ORDER BY id DESC
                  LIMIT 1",
                params![task_id],
                checkpoint_from_row,
            )
            .optional()?)
    }

    pub fn list_checkpoints(&self, task_id: i64) -> Result<Vec<Checkpoint>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, task_id, step_title, snapshot_json, created_at
               FROM checkpoints
              WHERE task_id = ?1
              ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![task_id])?;
        let mut checkpoints = Vec::new();
        while let Some(row) = rows.next()? {
            checkpoints.push(checkpoint_from_row(row)?);
        }
        Ok(checkpoints)
    }

    pub fn list_steps(&self, task_id: i64) -> Result<Vec<Step>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, task_id, title, status, evidence_json, order_no, created_at
               FROM steps
              WHERE task_id = ?1
              ORDER BY order_no ASC",
        )?;
        let mut rows = stmt.query(params![task_id])?;
        let mut steps = Vec::new();
        while let Some(row) = rows.next()? {
            steps.push(Step {
                id: row.get(0)?,
                task_id: row.get(1)?,
                title: row.get(2)?,
                status: row.get(3)?,
                evidence: row.get(4)?,
                order_no: row.get(5)?,
                recorded_at: row.get(6)?,
            });
        }
        Ok(steps)
    }
}
