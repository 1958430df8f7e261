//! Configuration surface: environment variables with defaults, a thin
//! `clap` CLI layered on top. Grounded in the teacher's `KeeperConfig` /
//! `Args` split — environment (or a deployment artifact, there) supplies
//! defaults, the CLI overrides them.

use crate::error::{Result, SchedulerError};
use clap::Parser;
use std::env;

#[derive(Parser, Debug)]
#[command(
    name = "sms-retry-scheduler",
    version,
    about = "Durable, at-least-once SMS retry scheduler"
)]
struct Args {
    /// Alternate .env file to load instead of the default `./.env`.
    #[arg(long)]
    config_file: Option<String>,

    /// Override S3_BUCKET.
    #[arg(long)]
    bucket: Option<String>,

    /// Run one recovery pass plus a single drain, then exit.
    #[arg(long)]
    once: bool,

    /// Use an in-memory Persistence Port instead of S3, and skip bucket
    /// bootstrap. Useful for local exercising of the admin façade.
    #[arg(long)]
    dry_run: bool,
}

/// Fully resolved configuration: environment, then CLI overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub aws_region: String,
    pub aws_endpoint_url: Option<String>,
    pub s3_bucket: String,
    pub s3_state_prefix: String,
    pub s3_success_prefix: String,
    pub s3_failed_prefix: String,
    pub api_host: String,
    pub api_port: u16,
    pub log_level: String,
    pub once: bool,
    pub dry_run: bool,
}

impl Config {
    /// Load a `.env` file (best effort — a missing file is not an error),
    /// parse CLI args, then merge environment defaults with CLI overrides.
    pub fn load() -> Result<Self> {
        let args = Args::parse();

        if let Some(path) = &args.config_file {
            dotenvy::from_filename(path).ok();
        } else {
            dotenvy::dotenv().ok();
        }

        let dry_run = args.dry_run;

        let s3_bucket = args
            .bucket
            .or_else(|| env::var("S3_BUCKET").ok())
            .unwrap_or_default();
        if s3_bucket.is_empty() && !dry_run {
            return Err(SchedulerError::Config(
                "S3_BUCKET must be set (or pass --dry-run)".into(),
            ));
        }

        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".into()),
            aws_endpoint_url: env::var("ENDPOINT_URL").ok(),
            s3_bucket,
            s3_state_prefix: env::var("S3_STATE_PREFIX").unwrap_or_else(|_| "state".into()),
            s3_success_prefix: env::var("S3_SUCCESS_PREFIX").unwrap_or_else(|_| "success".into()),
            s3_failed_prefix: env::var("S3_FAILED_PREFIX").unwrap_or_else(|_| "failed".into()),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            api_port,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            once: args.once,
            dry_run,
        })
    }

    /// Whether an explicit local/test endpoint is configured, mirroring
    /// the upstream notion of "local mode" (e.g. pointed at LocalStack).
    pub fn is_local(&self) -> bool {
        self.aws_endpoint_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_local_follows_endpoint_url() {
        let mut cfg = Config {
            aws_region: "us-east-1".into(),
            aws_endpoint_url: None,
            s3_bucket: "b".into(),
            s3_state_prefix: "state".into(),
            s3_success_prefix: "success".into(),
            s3_failed_prefix: "failed".into(),
            api_host: "0.0.0.0".into(),
            api_port: 8080,
            log_level: "info".into(),
            once: false,
            dry_run: false,
        };
        assert!(!cfg.is_local());
        cfg.aws_endpoint_url = Some("http://localhost:4566".into());
        assert!(cfg.is_local());
    }
}
