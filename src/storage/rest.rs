// src/storage/rest.rs

// Sorted-set store reached through a Redis-compatible REST API:
// batches go to `POST {url}/pipeline`, single commands to `POST {url}`,
// both with a bearer token and JSON command arrays.
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::RemoteStoreConfig;
use crate::error::{RateLimiterError, Result, StorageError};
use crate::storage::{ttl_secs, StorageBackend, StoragePipeline};
use crate::storage_op;

/// Commands queued for one `/pipeline` request
#[derive(Debug, Default)]
pub struct RestPipeline {
    commands: Vec<Vec<String>>,
    // first key touched, for logging
    key: Option<String>,
}

impl RestPipeline {
    fn push(&mut self, key: &str, command: Vec<String>) {
        if self.key.is_none() {
            self.key = Some(key.to_string());
        }
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Vec<String>] {
        &self.commands
    }
}

impl StoragePipeline for RestPipeline {
    fn purge_before(&mut self, key: &str, cutoff: u64) -> &mut Self {
        self.push(
            key,
            vec![
                "ZREMRANGEBYSCORE".to_string(),
                key.to_string(),
                "-inf".to_string(),
                format!("({}", cutoff),
            ],
        );
        self
    }

    fn count(&mut self, key: &str) -> &mut Self {
        self.push(key, vec!["ZCARD".to_string(), key.to_string()]);
        self
    }

    fn add(&mut self, key: &str, score: u64, member: &str) -> &mut Self {
        self.push(
            key,
            vec![
                "ZADD".to_string(),
                key.to_string(),
                score.to_string(),
                member.to_string(),
            ],
        );
        self
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> &mut Self {
        self.push(
            key,
            vec![
                "EXPIRE".to_string(),
                key.to_string(),
                ttl_secs(ttl).to_string(),
            ],
        );
        self
    }
}

/// One entry of a REST reply: either `{"result": ...}` or `{"error": "..."}`
#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl CommandReply {
    fn into_integer(self) -> Result<i64> {
        if let Some(error) = self.error {
            return Err(RateLimiterError::Storage(StorageError::Command(error)));
        }

        match self.result {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                RateLimiterError::Storage(StorageError::Serialization(format!(
                    "non-integer reply: {}",
                    n
                )))
            }),
            Some(Value::Bool(b)) => Ok(b as i64),
            Some(Value::String(s)) => s.parse::<i64>().map_err(|_| {
                RateLimiterError::Storage(StorageError::Serialization(format!(
                    "non-integer reply: {}",
                    s
                )))
            }),
            Some(other) => Err(RateLimiterError::Storage(StorageError::Serialization(
                format!("unsupported reply: {}", other),
            ))),
        }
    }
}

/// HTTP client for the REST sorted-set store
#[derive(Clone)]
pub struct RestStorage {
    client: Client,
    config: RemoteStoreConfig,
}

// Keeps the token out of logs
impl fmt::Debug for RestStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestStorage")
            .field("url", &self.config.url)
            .field("key_prefix", &self.config.key_prefix)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

impl RestStorage {
    pub fn new(config: RemoteStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RateLimiterError::Storage(StorageError::Connection(e.to_string())))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RemoteStoreConfig {
        &self.config
    }

    async fn post<B: serde::Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.token)
            .json(body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<Value>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RateLimiterError::Storage(
                StorageError::Auth(format!("store rejected token ({})", response.status())),
            )),
            status => Err(RateLimiterError::Storage(StorageError::UnexpectedStatus(
                status.as_u16(),
            ))),
        }
    }

    async fn send_command(&self, command: &[String]) -> Result<i64> {
        let body = self.post(&self.config.url, command).await?;
        let reply: CommandReply = serde_json::from_value(body)?;
        reply.into_integer()
    }

    async fn send_pipeline(&self, commands: &[Vec<String>]) -> Result<Vec<Result<i64>>> {
        let url = format!("{}/pipeline", self.config.url);
        let body = self.post(&url, commands).await?;
        let replies: Vec<CommandReply> = serde_json::from_value(body)?;

        if replies.len() != commands.len() {
            return Err(RateLimiterError::Storage(StorageError::Serialization(
                format!(
                    "expected {} pipeline replies, got {}",
                    commands.len(),
                    replies.len()
                ),
            )));
        }

        Ok(replies.into_iter().map(CommandReply::into_integer).collect())
    }

    /// Sends one command to the plain command endpoint
    pub async fn command(&self, command: &[String]) -> Result<i64> {
        let start = Instant::now();
        let result = self.send_command(command).await;

        let key = command.get(1).map(String::as_str).unwrap_or_default();
        storage_op!(
            command.first().map(String::as_str).unwrap_or_default(),
            key,
            result,
            start.elapsed().as_millis() as u64
        );
        result
    }
}

#[async_trait]
impl StorageBackend for RestStorage {
    type Config = RemoteStoreConfig;
    type Pipeline = RestPipeline;

    async fn new(config: Self::Config) -> Result<Self> {
        Self::new(config)
    }

    fn key_prefix(&self) -> &str {
        &self.config.key_prefix
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool> {
        let removed = self
            .command(&["ZREM".to_string(), key.to_string(), member.to_string()])
            .await?;
        Ok(removed > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self
            .command(&["DEL".to_string(), key.to_string()])
            .await?;
        Ok(removed > 0)
    }

    fn pipeline(&self) -> Self::Pipeline {
        RestPipeline::default()
    }

    async fn execute_pipeline(&self, pipeline: Self::Pipeline) -> Result<Vec<Result<i64>>> {
        let start = Instant::now();
        let result = self.send_pipeline(&pipeline.commands).await;

        storage_op!(
            "pipeline",
            pipeline.key.as_deref().unwrap_or_default(),
            result,
            start.elapsed().as_millis() as u64
        );
        result
    }
}
