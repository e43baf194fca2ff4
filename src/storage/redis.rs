// src/storage/redis.rs

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Pipeline};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RedisConfig;
use crate::error::{RateLimiterError, Result, StorageError};
use crate::storage::{ttl_secs, StorageBackend, StoragePipeline};
use crate::storage_op;

/// Redis pipeline implementation, sent as a MULTI/EXEC transaction
pub struct RedisPipeline {
    pipeline: Pipeline,
    len: usize,
}

impl RedisPipeline {
    /// Creates a new Redis pipeline
    fn new() -> Self {
        let mut pipeline = Pipeline::new();
        pipeline.atomic();
        Self { pipeline, len: 0 }
    }
}

impl StoragePipeline for RedisPipeline {
    fn purge_before(&mut self, key: &str, cutoff: u64) -> &mut Self {
        self.pipeline
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(format!("({}", cutoff));
        self.len += 1;
        self
    }

    fn count(&mut self, key: &str) -> &mut Self {
        self.pipeline.cmd("ZCARD").arg(key);
        self.len += 1;
        self
    }

    fn add(&mut self, key: &str, score: u64, member: &str) -> &mut Self {
        self.pipeline.cmd("ZADD").arg(key).arg(score).arg(member);
        self.len += 1;
        self
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> &mut Self {
        self.pipeline.cmd("EXPIRE").arg(key).arg(ttl_secs(ttl));
        self.len += 1;
        self
    }
}

pub struct RedisStorage {
    client: Client,
    connection: Arc<tokio::sync::Mutex<ConnectionManager>>,
    config: RedisConfig,
}

impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("url", &self.config.url)
            .field("key_prefix", &self.config.key_prefix)
            .finish()
    }
}

impl Clone for RedisStorage {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            connection: Arc::clone(&self.connection),
            config: self.config.clone(),
        }
    }
}

impl RedisStorage {
    /// Creates a new Redis storage with the given configuration
    pub async fn new(config: RedisConfig) -> Result<Self> {
        // Open the client - this doesn't actually connect to Redis yet
        let client = Client::open(config.url.as_str())
            .map_err(|e| RateLimiterError::Storage(StorageError::Connection(e.to_string())))?;

        let connection_manager =
            match tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client.clone()))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(RateLimiterError::Storage(StorageError::Connection(format!(
                        "Connection to Redis at {} timed out after {:?}",
                        config.url, config.connection_timeout
                    ))));
                }
            };

        Ok(Self {
            client,
            connection: Arc::new(tokio::sync::Mutex::new(connection_manager)),
            config,
        })
    }

    /// Ping Redis to check health with timeout
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.lock().await;
        let ping_future = redis::AsyncCommands::ping::<String>(&mut *conn);

        let result = match tokio::time::timeout(self.config.connection_timeout, ping_future).await {
            Ok(inner_result) => inner_result?,
            Err(_) => {
                return Err(RateLimiterError::Storage(StorageError::Connection(format!(
                    "Redis PING timed out after {:?}",
                    self.config.connection_timeout
                ))));
            }
        };

        if result == "PONG" {
            Ok(())
        } else {
            Err(RateLimiterError::Storage(StorageError::Command(format!(
                "Unexpected response from Redis PING: {}",
                result
            ))))
        }
    }
}

fn integer_reply(value: redis::Value) -> Result<i64> {
    match value {
        redis::Value::Int(i) => Ok(i),
        redis::Value::Nil => Ok(0),
        redis::Value::Okay => Ok(1),
        redis::Value::Boolean(b) => Ok(b as i64),
        redis::Value::ServerError(e) => Err(RateLimiterError::Storage(StorageError::Command(
            format!("{:?}", e),
        ))),
        redis::Value::BulkString(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                RateLimiterError::Storage(StorageError::Serialization(
                    "non-integer bulk reply".to_string(),
                ))
            }),
        other => Err(RateLimiterError::Storage(StorageError::Serialization(
            format!("Unsupported Redis reply: {:?}", other),
        ))),
    }
}

#[async_trait]
impl StorageBackend for RedisStorage {
    type Config = RedisConfig;
    type Pipeline = RedisPipeline;

    async fn new(config: Self::Config) -> Result<Self> {
        Self::new(config).await
    }

    fn key_prefix(&self) -> &str {
        &self.config.key_prefix
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.connection.lock().await;
        let removed: i64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let start = Instant::now();
        let mut conn = self.connection.lock().await;
        let result: std::result::Result<i64, redis::RedisError> = conn.del(key).await;
        storage_op!("DEL", key, result, start.elapsed().as_millis() as u64);
        Ok(result? > 0)
    }

    fn pipeline(&self) -> Self::Pipeline {
        RedisPipeline::new()
    }

    async fn execute_pipeline(&self, pipeline: Self::Pipeline) -> Result<Vec<Result<i64>>> {
        let start = Instant::now();
        let mut conn = self.connection.lock().await;
        let result: std::result::Result<Vec<redis::Value>, redis::RedisError> =
            pipeline.pipeline.query_async(&mut *conn).await;
        storage_op!("pipeline", "", result, start.elapsed().as_millis() as u64);

        let values = result?;
        if values.len() != pipeline.len {
            return Err(RateLimiterError::Storage(StorageError::Serialization(
                format!(
                    "expected {} pipeline replies, got {}",
                    pipeline.len,
                    values.len()
                ),
            )));
        }

        Ok(values.into_iter().map(integer_reply).collect())
    }
}
