pub mod models;
pub mod processor;
pub mod schema;
pub mod storage;
pub mod utils;

use common::config::Settings;
use common::{Error, Result};
use processor::{RunResult, RunState, TransformPipeline};
use std::sync::Arc;
use storage::{S3Config, S3Manager, StorageLocation, StorageRoot};
use tracing::error;
use uuid::Uuid;

/// Resolves the configured input and output roots to storage backends.
pub async fn open_roots(settings: &Settings) -> Result<(StorageRoot, StorageRoot)> {
    settings.transform.validate()?;
    let s3_manager = settings
        .s3
        .as_ref()
        .map(|s3| Arc::new(S3Manager::new(S3Config::from(s3))));

    let input_location = StorageLocation::parse(&settings.transform.input_root)?;
    let output_location = StorageLocation::parse(&settings.transform.output_root)?;

    let input = StorageRoot::open(&input_location, s3_manager.as_ref())
        .await
        .map_err(|e| match e {
            Error::InvalidInput(_) | Error::InvalidUri(_) => e,
            other => Error::Ingest(format!(
                "Cannot open input {}: {}",
                settings.transform.input_root, other
            )),
        })?;
    let output = StorageRoot::open(&output_location, s3_manager.as_ref())
        .await
        .map_err(|e| match e {
            Error::InvalidInput(_) | Error::InvalidUri(_) => e,
            other => Error::write(settings.transform.output_root.as_str(), other),
        })?;
    Ok((input, output))
}

/// Runs one transform with the given settings and reports its outcome.
pub async fn run_transform(settings: &Settings) -> RunResult {
    let run_id = Uuid::new_v4();
    match open_roots(settings).await {
        Ok((input, output)) => {
            TransformPipeline::new(input, output, &settings.transform)
                .run_with_id(run_id)
                .await
        }
        Err(e) => {
            error!(run_id = %run_id, error = %e, "Cannot open storage for transform run");
            RunResult::failed(run_id, RunState::Init, &e)
        }
    }
}
