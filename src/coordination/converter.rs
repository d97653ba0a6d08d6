use anyhow::{Result, bail};
use arrow::datatypes::SchemaRef;
use derive_builder::Builder;
use futures::{Stream, TryStreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::formats::RowBatch;
use crate::sink::{BatchSink, SinkFactory, output_path_for};
use crate::telemetry::{ProgressStats, TelemetryEvent};

/// Configuration for one conversion pass
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct ConverterConfig {
    /// Directory the output files are written into
    pub output_dir: PathBuf,
    /// Number of sources expected, used only to size the progress bar
    #[builder(default)]
    pub expected_files: u64,
    #[builder(default)]
    pub quiet: bool,
}

/// What was written for one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub rows_written: u64,
    pub batches_written: u64,
}

/// Result of a completed conversion pass
#[derive(Debug)]
pub struct ConversionResult {
    pub files: Vec<OutputFile>,
    pub rows_written: u64,
    pub batches_written: u64,
    pub duration: Duration,
}

/// The sink currently receiving batches, and the source feeding it
struct ActiveSink {
    source: PathBuf,
    output: PathBuf,
    sink: Box<dyn BatchSink>,
}

/// Routes a stream of row batches into one output per source file
///
/// A new sink is opened whenever the output path derived from a batch's
/// source differs from the previous batch's; the previous sink is closed
/// first. Sources must arrive contiguously: a batch whose output was already
/// closed fails the run instead of overwriting that output.
pub struct Converter {
    sink_factory: Arc<dyn SinkFactory>,
}

impl Converter {
    pub fn new(sink_factory: Arc<dyn SinkFactory>) -> Self {
        Self { sink_factory }
    }

    /// Drain `batches` into sinks under `config.output_dir`
    pub async fn run<S>(
        &self,
        config: &ConverterConfig,
        schema: SchemaRef,
        mut batches: S,
    ) -> Result<ConversionResult>
    where
        S: Stream<Item = Result<RowBatch>> + Unpin,
    {
        let start_time = Instant::now();

        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
        let prog_jh = Self::setup_progress_tracking(config, telemetry_rx);

        let outcome = self
            .write_all(config, schema, &mut batches, &telemetry_tx)
            .await;

        // Close the channel so the progress task can finish before we report
        drop(telemetry_tx);
        if let Some(jh) = prog_jh {
            let _ = jh.await;
        }

        let files = outcome?;
        let rows_written = files.iter().map(|f| f.rows_written).sum();
        let batches_written = files.iter().map(|f| f.batches_written).sum();
        let duration = start_time.elapsed();

        info!(
            "Converted {} files: {} rows in {} batches in {:.2}s",
            files.len(),
            rows_written,
            batches_written,
            duration.as_secs_f64()
        );

        Ok(ConversionResult {
            files,
            rows_written,
            batches_written,
            duration,
        })
    }

    async fn write_all<S>(
        &self,
        config: &ConverterConfig,
        schema: SchemaRef,
        batches: &mut S,
        telemetry_tx: &mpsc::UnboundedSender<TelemetryEvent>,
    ) -> Result<Vec<OutputFile>>
    where
        S: Stream<Item = Result<RowBatch>> + Unpin,
    {
        let mut files = Vec::new();
        let mut closed_outputs: HashSet<PathBuf> = HashSet::new();
        let mut active: Option<ActiveSink> = None;

        while let Some(row_batch) = batches.try_next().await? {
            let output = output_path_for(
                &row_batch.source,
                &config.output_dir,
                self.sink_factory.extension(),
            )?;

            let current = match active.take() {
                Some(sink) if sink.output == output => active.insert(sink),
                previous => {
                    if let Some(previous) = previous {
                        closed_outputs.insert(previous.output.clone());
                        files.push(Self::close_sink(previous, telemetry_tx)?);
                    }
                    if closed_outputs.contains(&output) {
                        bail!(
                            "Batches for {} arrived after {} was closed; \
                             sources must be read one after another",
                            row_batch.source.display(),
                            output.display()
                        );
                    }
                    let opened =
                        self.open_sink(&row_batch, output, Arc::clone(&schema), telemetry_tx)?;
                    active.insert(opened)
                }
            };

            let write_start = Instant::now();
            current.sink.write(&row_batch.batch)?;
            let _ = telemetry_tx.send(TelemetryEvent::BatchWritten {
                rows: row_batch.batch.num_rows() as u64,
                duration_ms: write_start.elapsed().as_millis() as u64,
            });
        }

        if let Some(last) = active.take() {
            files.push(Self::close_sink(last, telemetry_tx)?);
        }

        Ok(files)
    }

    fn open_sink(
        &self,
        row_batch: &RowBatch,
        output: PathBuf,
        schema: SchemaRef,
        telemetry_tx: &mpsc::UnboundedSender<TelemetryEvent>,
    ) -> Result<ActiveSink> {
        info!(
            "Converting {} -> {}",
            row_batch.source.display(),
            output.display()
        );
        let sink = self.sink_factory.create(&output, schema)?;
        let _ = telemetry_tx.send(TelemetryEvent::FileStarted);

        Ok(ActiveSink {
            source: row_batch.source.clone(),
            output,
            sink,
        })
    }

    fn close_sink(
        active: ActiveSink,
        telemetry_tx: &mpsc::UnboundedSender<TelemetryEvent>,
    ) -> Result<OutputFile> {
        let ActiveSink {
            source,
            output,
            sink,
        } = active;
        let summary = sink.close()?;

        debug!(
            "Closed {} ({} rows, {} batches)",
            output.display(),
            summary.rows_written,
            summary.batches_written
        );
        let _ = telemetry_tx.send(TelemetryEvent::FileCompleted {
            rows: summary.rows_written,
        });

        Ok(OutputFile {
            source,
            output,
            rows_written: summary.rows_written,
            batches_written: summary.batches_written,
        })
    }

    /// Setup progress tracking with progress bars
    fn setup_progress_tracking(
        config: &ConverterConfig,
        mut telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if config.quiet {
            return None;
        }

        let multi_progress = MultiProgress::new();

        let files_bar = multi_progress.add(ProgressBar::new(config.expected_files));
        files_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] Files:      [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );

        let rows_bar = multi_progress.add(ProgressBar::new_spinner());
        rows_bar.set_style(
            ProgressStyle::default_spinner()
                .template("[{elapsed_precise}] Rows:       {human_pos} | {per_sec}")
                .unwrap(),
        );

        let stats_bar = multi_progress.add(ProgressBar::new(0));
        stats_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] Batch Time: {msg}")
                .unwrap(),
        );

        Some(tokio::spawn(async move {
            let mut stats = ProgressStats::new();

            while let Some(event) = telemetry_rx.recv().await {
                stats.update(&event);

                if let TelemetryEvent::FileCompleted { rows } = event {
                    files_bar.set_message(format!("(last file: {} rows)", rows));
                }
                files_bar.set_position(stats.files_completed as u64);
                rows_bar.set_position(stats.rows_written);

                if !matches!(event, TelemetryEvent::BatchWritten { .. }) {
                    continue;
                }
                let (p50, p90, p99) = stats.get_percentiles();
                if let (Some(p50), Some(p90), Some(p99)) = (p50, p90, p99) {
                    stats_bar
                        .set_message(format!("p50: {}ms, p90: {}ms, p99: {}ms", p50, p90, p99));
                }
            }

            files_bar.finish_with_message("All files converted");
            rows_bar.finish();
            stats_bar.finish();
        }))
    }
}
