//! Thin per-command wrappers: every method here just builds an argument
//! list and calls `execute`, replacing the reflection a dynamically-typed
//! client would use to turn a method name into a wire command.
//!
//! Implemented once as a blanket trait over anything that can `execute` a
//! raw command — [`Connection`](crate::connection::Connection),
//! [`ClusterRouter`](crate::cluster::ClusterRouter), and
//! [`Client`](crate::client::Client) all get every command for free.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::resp::Value;

/// Anything that can dispatch a raw RESP command and await its reply.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, args: &[&[u8]]) -> Result<Value>;
}

fn itoa(n: i64) -> Bytes {
    Bytes::from(n.to_string().into_bytes())
}

/// Typed command wrappers, implemented once for every [`Executor`].
#[async_trait]
pub trait RedisCommands: Executor {
    // -- strings --------------------------------------------------------
    async fn get(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"GET", key]).await
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<Value> {
        self.execute(&[b"SET", key, value]).await
    }

    async fn getset(&self, key: &[u8], value: &[u8]) -> Result<Value> {
        self.execute(&[b"GETSET", key, value]).await
    }

    async fn del(&self, keys: &[&[u8]]) -> Result<Value> {
        let mut args = vec![b"DEL".as_slice()];
        args.extend_from_slice(keys);
        self.execute(&args).await
    }

    async fn exists(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"EXISTS", key]).await
    }

    async fn expire(&self, key: &[u8], seconds: i64) -> Result<Value> {
        let seconds = itoa(seconds);
        self.execute(&[b"EXPIRE", key, &seconds]).await
    }

    async fn ttl(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"TTL", key]).await
    }

    async fn incr(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"INCR", key]).await
    }

    async fn decr(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"DECR", key]).await
    }

    async fn incrby(&self, key: &[u8], delta: i64) -> Result<Value> {
        let delta = itoa(delta);
        self.execute(&[b"INCRBY", key, &delta]).await
    }

    async fn append(&self, key: &[u8], value: &[u8]) -> Result<Value> {
        self.execute(&[b"APPEND", key, value]).await
    }

    async fn strlen(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"STRLEN", key]).await
    }

    async fn mget(&self, keys: &[&[u8]]) -> Result<Value> {
        let mut args = vec![b"MGET".as_slice()];
        args.extend_from_slice(keys);
        self.execute(&args).await
    }

    // -- lists ------------------------------------------------------------
    async fn lpush(&self, key: &[u8], values: &[&[u8]]) -> Result<Value> {
        let mut args = vec![b"LPUSH".as_slice(), key];
        args.extend_from_slice(values);
        self.execute(&args).await
    }

    async fn rpush(&self, key: &[u8], values: &[&[u8]]) -> Result<Value> {
        let mut args = vec![b"RPUSH".as_slice(), key];
        args.extend_from_slice(values);
        self.execute(&args).await
    }

    async fn lpop(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"LPOP", key]).await
    }

    async fn rpop(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"RPOP", key]).await
    }

    async fn llen(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"LLEN", key]).await
    }

    async fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Value> {
        let start = itoa(start);
        let stop = itoa(stop);
        self.execute(&[b"LRANGE", key, &start, &stop]).await
    }

    // -- hashes -----------------------------------------------------------
    async fn hget(&self, key: &[u8], field: &[u8]) -> Result<Value> {
        self.execute(&[b"HGET", key, field]).await
    }

    async fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> Result<Value> {
        self.execute(&[b"HSET", key, field, value]).await
    }

    async fn hgetall(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"HGETALL", key]).await
    }

    async fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> Result<Value> {
        let mut args = vec![b"HDEL".as_slice(), key];
        args.extend_from_slice(fields);
        self.execute(&args).await
    }

    // -- sets ---------------------------------------------------------------
    async fn sadd(&self, key: &[u8], members: &[&[u8]]) -> Result<Value> {
        let mut args = vec![b"SADD".as_slice(), key];
        args.extend_from_slice(members);
        self.execute(&args).await
    }

    async fn smembers(&self, key: &[u8]) -> Result<Value> {
        self.execute(&[b"SMEMBERS", key]).await
    }

    async fn sismember(&self, key: &[u8], member: &[u8]) -> Result<Value> {
        self.execute(&[b"SISMEMBER", key, member]).await
    }

    // -- pub/sub, transactions, introspection --------------------------------
    async fn publish(&self, channel: &[u8], payload: &[u8]) -> Result<Value> {
        self.execute(&[b"PUBLISH", channel, payload]).await
    }

    async fn ping(&self) -> Result<Value> {
        self.execute(&[b"PING"]).await
    }

    async fn select(&self, database: i64) -> Result<Value> {
        let database = itoa(database);
        self.execute(&[b"SELECT", &database]).await
    }
}

impl<T: Executor + ?Sized> RedisCommands for T {}
