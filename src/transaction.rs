//! Transaction coordinator: MULTI serialization, pending-tx queue, and
//! EXEC/DISCARD fan-in for a single connection.
//!
//! A fresh [`MultiTransaction`] per `multi()` call is backed by a fair
//! `tokio::sync::Mutex` held for the body's whole lifetime. Acquiring that
//! mutex *is* "await all predecessor transactions' completion futures":
//! tokio's mutex wakes waiters in acquire order, so a second `multi()` on
//! the same connection blocks until the first's EXEC/DISCARD has run,
//! without a second queue to track that ordering explicitly.

use tokio::sync::{oneshot, Mutex};

use crate::connection::Connection;
use crate::error::{RedisError, Result};
use crate::resp::Value;

/// Per-connection lock enforcing that at most one MULTI transaction is
/// open, and that transactions resolve in the order they were opened.
#[derive(Clone, Default)]
pub struct TransactionLock(std::sync::Arc<Mutex<()>>);

impl TransactionLock {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Builder handed to the `body` closure passed to [`multi`]: every command
/// queued through it is sent immediately (receiving a wire-level `QUEUED`
/// ack the coordinator discards) but its user-visible result is deferred
/// until `EXEC` resolves.
pub struct MultiBody<'a> {
    conn: &'a Connection,
    senders: Vec<oneshot::Sender<Result<Value>>>,
    receivers: Vec<oneshot::Receiver<Result<Value>>>,
}

impl<'a> MultiBody<'a> {
    /// Queue `args` inside the open transaction. Returns an index that can
    /// be matched against the `Vec<Result<Value>>` `multi` eventually
    /// returns (they're issued in call order).
    pub fn queue(&mut self, args: &[&[u8]]) -> Result<usize> {
        self.conn.execute_queued(args)?;
        let (tx, rx) = oneshot::channel();
        self.senders.push(tx);
        self.receivers.push(rx);
        Ok(self.receivers.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}

/// Run `body` inside a `MULTI` ... `EXEC` window on `conn`, serialized
/// against any other transaction on the same connection via `lock`.
///
/// `body` receives a [`MultiBody`] to queue commands on and returns
/// `Ok(())` to commit (issue `EXEC`) or `Err` to abort (issue `DISCARD`).
/// On success, returns each queued command's reply in call order; on a
/// server-side abort (`EXEC` replied nil because a `WATCH`ed key changed)
/// every slot fails with [`RedisError::Aborted`].
pub async fn multi<F>(conn: &Connection, lock: &TransactionLock, body: F) -> Result<Vec<Result<Value>>>
where
    F: FnOnce(&mut MultiBody<'_>) -> Result<()>,
{
    let _guard = lock.0.lock().await;

    let multi_reply = conn.execute(&[b"MULTI"]).await?;
    if let Some(err) = multi_reply.as_error_str() {
        return Err(RedisError::Server(err.to_string()));
    }

    let mut builder = MultiBody {
        conn,
        senders: Vec::new(),
        receivers: Vec::new(),
    };
    let body_result = body(&mut builder);
    let MultiBody { senders, receivers, .. } = builder;

    match body_result {
        Ok(()) => {
            conn.execute_exec(&[b"EXEC"], senders).await?;
        }
        Err(body_err) => {
            // DISCARD still needs to consume the server's reply to keep
            // the pending queue (and thus subsequent commands) in sync,
            // so it goes through the same fan-in path as EXEC; the actor
            // resolves every deferred sender with `aborted` once it sees
            // DISCARD's non-array reply (see `resolve_exec`).
            let _ = conn.execute_exec(&[b"DISCARD"], senders).await;
            return Err(body_err);
        }
    }

    let mut out = Vec::with_capacity(receivers.len());
    for rx in receivers {
        out.push(
            rx.await
                .unwrap_or_else(|_| Err(RedisError::Disconnected("connection closed mid-transaction".into()))),
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_lock_is_cloneable_and_shares_one_mutex() {
        let lock = TransactionLock::new();
        let clone = lock.clone();
        assert!(std::sync::Arc::ptr_eq(&lock.0, &clone.0));
    }
}
