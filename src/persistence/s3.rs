//! S3-backed Persistence Port.
//!
//! The scheduler core is synchronous by design (see `scheduler.rs`), but
//! `aws-sdk-s3` is async-only. This impl bridges the two by holding a
//! `tokio::runtime::Handle` and calling `Handle::block_on` from whichever
//! thread invokes a `PersistencePort` method — the dedicated wakeup thread,
//! or an axum handler's `spawn_blocking` task. Neither of those runs *on* a
//! runtime worker thread doing async work, so blocking there is safe on a
//! multi-thread runtime.

use super::{deserialize, log_key, pending_key, serialize};
use super::{DEFAULT_FAILED_PREFIX, DEFAULT_STATE_PREFIX, DEFAULT_SUCCESS_PREFIX};
use crate::error::{Result, SchedulerError};
use crate::models::MessageState;
use crate::persistence::PersistencePort;
use aws_sdk_s3::Client;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Configuration for constructing an [`S3Persistence`].
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub state_prefix: String,
    pub success_prefix: String,
    pub failed_prefix: String,
    pub region: Option<String>,
    /// Local-endpoint override for test storage (e.g. LocalStack).
    pub endpoint_url: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            state_prefix: DEFAULT_STATE_PREFIX.to_string(),
            success_prefix: DEFAULT_SUCCESS_PREFIX.to_string(),
            failed_prefix: DEFAULT_FAILED_PREFIX.to_string(),
            region: None,
            endpoint_url: None,
        }
    }
}

pub struct S3Persistence {
    client: Client,
    bucket: String,
    state_prefix: String,
    success_prefix: String,
    failed_prefix: String,
    runtime: Handle,
}

impl S3Persistence {
    /// Build an S3-backed persistence layer. Must be called from within a
    /// running tokio runtime (it awaits config/client construction and the
    /// bucket-bootstrap call). Captures `Handle::current()` for later
    /// synchronous calls through the `PersistencePort` trait.
    pub async fn connect(config: S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(SchedulerError::Config("S3_BUCKET must be set".into()));
        }

        let mut loader = aws_config::from_env();
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let mut sdk_config = loader.load().await;
        if let Some(endpoint) = &config.endpoint_url {
            let mut builder = sdk_config.to_builder();
            builder.set_endpoint_url(Some(endpoint.clone()));
            sdk_config = builder.build();
        }

        let client = Client::new(&sdk_config);

        let this = Self {
            client,
            bucket: config.bucket,
            state_prefix: config.state_prefix,
            success_prefix: config.success_prefix,
            failed_prefix: config.failed_prefix,
            runtime: Handle::current(),
        };

        this.ensure_bucket_exists().await;
        Ok(this)
    }

    /// Create the bucket if it doesn't exist yet (mainly useful against
    /// LocalStack-style local endpoints). Best-effort: failures are logged,
    /// not propagated, matching the original's `_ensure_bucket_exists`.
    async fn ensure_bucket_exists(&self) {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => info!(bucket = %self.bucket, "S3 bucket exists"),
            Err(_) => match self.client.create_bucket().bucket(&self.bucket).send().await {
                Ok(_) => info!(bucket = %self.bucket, "created S3 bucket"),
                Err(e) => warn!(bucket = %self.bucket, error = %e, "failed to create bucket"),
            },
        }
    }

    fn pending_key(&self, message_id: &str) -> String {
        pending_key(&self.state_prefix, message_id)
    }

    async fn put(&self, key: &str, body: String) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body.into_bytes().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| SchedulerError::Persistence(format!("put {key} failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| SchedulerError::Persistence(format!("read {key} failed: {e}")))?
                    .into_bytes();
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|e| SchedulerError::Persistence(format!("non-utf8 {key}: {e}")))?;
                Ok(Some(text))
            }
            Err(e) => {
                if e.as_service_error().map(|e| e.is_no_such_key()).unwrap_or(false) {
                    Ok(None)
                } else {
                    Err(SchedulerError::Persistence(format!("get {key} failed: {e}")))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SchedulerError::Persistence(format!("delete {key} failed: {e}")))?;
        Ok(())
    }

    async fn load_all_pending_async(&self) -> Result<Vec<MessageState>> {
        let mut states = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&self.state_prefix);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let page = req
                .send()
                .await
                .map_err(|e| SchedulerError::Persistence(format!("list pending failed: {e}")))?;

            for obj in page.contents() {
                let Some(key) = obj.key() else { continue };
                match self.get(key).await {
                    Ok(Some(raw)) => match deserialize(&raw) {
                        Ok(state) if state.status == crate::models::MessageStatus::Pending => {
                            states.push(state)
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(key, error = %e, "failed to parse pending record; skipping")
                        }
                    },
                    Ok(None) => {}
                    Err(e) => error!(key, error = %e, "failed to load pending record; skipping"),
                }
            }

            if page.is_truncated().unwrap_or(false) {
                continuation = page.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        debug!(count = states.len(), "loaded pending messages from S3");
        Ok(states)
    }

    async fn recent_from_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<MessageState>> {
        // A single page, capped at `limit` (max 1000, the S3 API's page size
        // limit). This mirrors a known limitation in the original Python
        // implementation: beyond one page, results are not truly "most
        // recent" overall, only most recent within the first page returned.
        // Preserved intentionally rather than silently fixed.
        let capped = limit.min(1000) as i32;
        let page = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(capped)
            .send()
            .await
            .map_err(|e| SchedulerError::Persistence(format!("list {prefix} failed: {e}")))?;

        let mut objects: Vec<_> = page.contents().to_vec();
        objects.sort_by(|a, b| b.last_modified().cmp(&a.last_modified()));
        objects.truncate(limit);

        let mut results = Vec::with_capacity(objects.len());
        for obj in objects {
            let Some(key) = obj.key() else { continue };
            match self.get(key).await {
                Ok(Some(raw)) => match deserialize(&raw) {
                    Ok(state) => results.push(state),
                    Err(e) => error!(key, error = %e, "failed to parse log record; skipping"),
                },
                Ok(None) => {}
                Err(e) => error!(key, error = %e, "failed to load log record; skipping"),
            }
        }
        Ok(results)
    }
}

impl PersistencePort for S3Persistence {
    fn save_pending(&self, state: &MessageState) -> Result<()> {
        let key = self.pending_key(&state.message_id);
        let body = serialize(state)?;
        self.runtime.block_on(self.put(&key, body))
    }

    fn load_pending(&self, message_id: &str) -> Result<Option<MessageState>> {
        let key = self.pending_key(message_id);
        let raw = self.runtime.block_on(self.get(&key))?;
        raw.map(|r| deserialize(&r)).transpose()
    }

    fn load_all_pending(&self) -> Result<Vec<MessageState>> {
        self.runtime.block_on(self.load_all_pending_async())
    }

    fn delete_pending(&self, message_id: &str) -> Result<()> {
        let key = self.pending_key(message_id);
        self.runtime.block_on(self.delete(&key))
    }

    fn write_success(&self, state: &MessageState) -> Result<()> {
        let key = log_key(&self.success_prefix, &state.message_id);
        let body = serialize(state)?;
        self.runtime.block_on(self.put(&key, body))
    }

    fn write_failed(&self, state: &MessageState) -> Result<()> {
        let key = log_key(&self.failed_prefix, &state.message_id);
        let body = serialize(state)?;
        self.runtime.block_on(self.put(&key, body))
    }

    fn recent_success(&self, limit: usize) -> Result<Vec<MessageState>> {
        self.runtime
            .block_on(self.recent_from_prefix(&self.success_prefix, limit))
    }

    fn recent_failed(&self, limit: usize) -> Result<Vec<MessageState>> {
        self.runtime
            .block_on(self.recent_from_prefix(&self.failed_prefix, limit))
    }
}
