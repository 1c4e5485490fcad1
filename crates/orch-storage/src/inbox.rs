#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::mirror::bump_version_tx;
use crate::support::now_timestamp;
use crate::types::{InboxMessage, InboxMessageCreateArgs};
use crate::SqliteStore;
use rusqlite::{params, Row};

const INBOX_COLUMNS: &str =
    "id, sender_thread_id, receiver_thread_id, message, status, created_at, delivered_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<InboxMessage> {
    Ok(InboxMessage {
        id: row.get(0)?,
        sender_thread_id: row.get(1)?,
        receiver_thread_id: row.get(2)?,
        message: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        delivered_at: row.get(6)?,
    })
}

impl SqliteStore {
    pub fn create_inbox_message(
        &mut self,
        args: InboxMessageCreateArgs,
    ) -> Result<InboxMessage, StoreError> {
        if args.sender_thread_id <= 0 {
            return Err(StoreError::InvalidInput("sender_thread_id is required"));
        }
        if args.receiver_thread_id <= 0 {
            return Err(StoreError::InvalidInput("receiver_thread_id is required"));
        }
        let message = args.message.trim().to_string();
        if message.is_empty() {
            return Err(StoreError::InvalidInput("message is required"));
        }

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO inbox_messages(sender_thread_id, receiver_thread_id, message, status, created_at, delivered_at)
             VALUES(?1, ?2, ?3, 'pending', ?4, NULL)",
            params![
                args.sender_thread_id,
                args.receiver_thread_id,
                message,
                now_timestamp()
            ],
        )?;
        let message_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let inbox_message = tx.query_row(
            &format!("SELECT {INBOX_COLUMNS} FROM inbox_messages WHERE id = ?1"),
            params![message_id],
            message_from_row,
        )?;
        tx.commit()?;
        Ok(inbox_message)
    }

    pub fn list_pending_inbox_messages(
        &self,
        receiver_thread_id: i64,
    ) -> Result<Vec<InboxMessage>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {INBOX_COLUMNS}
               FROM inbox_messages
              WHERE receiver_thread_id = ?1 AND status = 'pending'
              ORDER BY id ASC"
        ))?;
        let mut rows = stmt.query(params![receiver_thread_id])?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(message_from_row(row)?);
        }
        Ok(messages)
    }

    pub fn list_inbox_messages(&self, thread_id: i64) -> Result<Vec<InboxMessage>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {INBOX_COLUMNS}
               FROM inbox_messages
              WHERE sender_thread_id = ?1 OR receiver_thread_id = ?1
              ORDER BY id ASC"
        ))?;
        let mut rows = stmt.query(params![thread_id])?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(message_from_row(row)?);
        }
        Ok(messages)
    }

    pub fn mark_inbox_message_delivered(
        &mut self,
        message_id: i64,
    ) -> Result<InboxMessage, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let changed = tx.execute(
            "UPDATE inbox_messages
                SET status = 'delivered', delivered_at = ?1
              WHERE id = ?2 AND status = 'pending'",
            params![now_timestamp(), message_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "pending inbox message",
                id: message_id,
            });
        }
        bump_version_tx(&tx)?;
        let message = tx.query_row(
            &format!("SELECT {INBOX_COLUMNS} FROM inbox_messages WHERE id = ?1"),
            params![message_id],
            message_from_row,
        )?;
        tx.commit()?;
        Ok(message)
    }

    /// Batch transition pending → delivered for a receiver, returning the
    /// delivered set in send order.
    pub fn deliver_pending_inbox_messages(
        &mut self,
        receiver_thread_id: i64,
    ) -> Result<Vec<InboxMessage>, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        let changed = tx.execute(
            "UPDATE inbox_messages
                SET status = 'delivered', delivered_at = ?1
              WHERE receiver_thread_id = ?2 AND status = 'pending'",
            params![now, receiver_thread_id],
        )?;
        if changed > 0 {
            bump_version_tx(&tx)?;
        }
        let mut delivered = Vec::new();
        {
            let mut stmt = tx.prepare(&format!(
                "SELECT {INBOX_COLUMNS}
                   FROM inbox_messages
                  WHERE receiver_thread_id = ?1 AND status = 'delivered' AND delivered_at = ?2
                  ORDER BY id ASC"
            ))?;
            let mut rows = stmt.query(params![receiver_thread_id, now])?;
            while let Some(row) = rows.next()? {
                delivered.push(message_from_row(row)?);
            }
        }
        tx.commit()?;
        Ok(delivered)
    }
}
