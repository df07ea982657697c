pub mod dimensions;
pub mod facts;
pub mod parser;
pub mod result;
pub mod state;
pub mod writer;

pub use dimensions::Dimensions;
pub use facts::{FactResolver, FactTables};
pub use parser::{ParsedInput, RecordReader, SourceKind};
pub use result::{RunError, RunResult, RunStatus};
pub use state::RunState;
pub use writer::{PartitionedWriter, TableWrite, read_committed_table};

use crate::storage::StorageRoot;
use common::Result;
use common::config::TransformSettings;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

/// One end-to-end transform over caller-provided input and output roots.
pub struct TransformPipeline {
    reader: RecordReader,
    writer: PartitionedWriter,
    settings: TransformSettings,
}

impl TransformPipeline {
    pub fn new(input: StorageRoot, output: StorageRoot, settings: &TransformSettings) -> Self {
        Self {
            reader: RecordReader::new(input, settings.read_concurrency),
            writer: PartitionedWriter::new(output, settings.write_concurrency),
            settings: settings.clone(),
        }
    }

    pub async fn run(&self) -> RunResult {
        self.run_with_id(Uuid::new_v4()).await
    }

    /// Runs every stage in order. Never panics on bad data: any fatal error
    /// ends the run in `FAILED` and is reported in the result.
    pub async fn run_with_id(&self, run_id: Uuid) -> RunResult {
        let span = info_span!("transform", run_id = %run_id);
        async move {
            let mut result = RunResult::new(run_id);
            let mut state = RunState::Init;
            info!("Starting transform run");

            match self.execute(&mut state, &mut result).await {
                Ok(()) => info!(
                    row_counts = ?result.row_counts,
                    partitions = ?result.partitions_written,
                    "Transform run succeeded"
                ),
                Err(e) => {
                    error!(stage = %state, kind = ?e.kind(), error = %e, "Transform run failed");
                    result.fail(state, &e);
                    state = state.transition(RunState::Failed).unwrap_or(RunState::Failed);
                    info!(stage = %state, "Run stopped");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    fn advance(state: &mut RunState, to: RunState) -> Result<()> {
        *state = state.transition(to)?;
        info!(stage = %state, "Entering stage");
        Ok(())
    }

    async fn execute(&self, state: &mut RunState, result: &mut RunResult) -> Result<()> {
        self.settings.validate()?;

        Self::advance(state, RunState::Parse)?;
        let input = self.parse().await?;
        result.malformed_counts = input.malformed_counts();
        input.check_thresholds(self.settings.malformed_threshold)?;

        // Dimensions are complete values before any fact is resolved
        Self::advance(state, RunState::BuildDimensions)?;
        let dimensions = Dimensions::build(&input.catalog, &input.events);

        Self::advance(state, RunState::ResolveFacts)?;
        let facts = FactResolver::new(self.settings.duration_tolerance)
            .resolve(&input.events, &dimensions)
            .await?;
        result.duplicate_events = facts.duplicate_events;

        Self::advance(state, RunState::Write)?;
        let mut record = |write: TableWrite| {
            result.row_counts.insert(write.table, write.rows);
            result
                .partitions_written
                .insert(write.table, write.partitions.len());
        };
        record(self.writer.write_table(&dimensions.artists).await?);
        record(self.writer.write_table(&dimensions.songs).await?);
        record(self.writer.write_table(&dimensions.users).await?);
        record(self.writer.write_table(&facts.time).await?);
        record(self.writer.write_table(&facts.songplays).await?);

        Self::advance(state, RunState::Done)
    }

    async fn parse(&self) -> Result<ParsedInput> {
        let mut input = ParsedInput::default();
        self.reader
            .read_source(SourceKind::Catalog, &self.settings.catalog_prefix, &mut input)
            .await?;
        self.reader
            .read_source(SourceKind::Events, &self.settings.events_prefix, &mut input)
            .await?;
        Ok(input)
    }
}
