use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tally_config::Config;
use tally_metrics::{ConverterService, MetricBatch};

/// Arguments of the `convert` command.
#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Path to a file with one metric batch per line (defaults to stdin).
    pub input: Option<PathBuf>,

    /// Pretty print the converted output.
    #[arg(long)]
    pub pretty: bool,
}

/// Totals of one conversion run.
#[derive(Debug, Default, PartialEq)]
struct Totals {
    batches: usize,
    points: usize,
    dropped: usize,
}

/// Runs the `convert` command.
///
/// The converter lives on a multi-threaded runtime so its state is swept while input is read.
pub fn run(config: &Config, args: ConvertArgs) -> Result<()> {
    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open input file {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("tally-sweep")
        .enable_time()
        .build()
        .context("failed to start runtime")?;

    let totals = runtime.block_on(async {
        let service = ConverterService::start(config.conversion().clone());
        let result = convert_lines(&service, input, io::stdout().lock(), args.pretty);
        service.shutdown().await;
        result
    })?;

    tally_log::info!(
        batches = totals.batches,
        points = totals.points,
        dropped = totals.dropped,
        "conversion finished"
    );

    Ok(())
}

/// Converts every non-empty line of `input` and writes one result per line to `output`.
fn convert_lines<R, W>(
    service: &ConverterService,
    input: R,
    mut output: W,
    pretty: bool,
) -> Result<Totals>
where
    R: BufRead,
    W: Write,
{
    let mut totals = Totals::default();

    for (index, line) in input.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }

        let batch: MetricBatch = serde_json::from_str(&line)
            .with_context(|| format!("failed to parse metric batch on line {}", index + 1))?;

        let converted = service.convert(&batch);
        if converted.dropped > 0 {
            tally_log::debug!(
                line = index + 1,
                dropped = converted.dropped,
                "dropped time series"
            );
        }

        totals.batches += 1;
        totals.points += converted.points.len();
        totals.dropped += converted.dropped;

        if pretty {
            serde_json::to_writer_pretty(&mut output, &converted)
        } else {
            serde_json::to_writer(&mut output, &converted)
        }
        .context("failed to serialize output")?;
        writeln!(output).context("failed to write output")?;
    }

    output.flush().context("failed to write output")?;
    Ok(totals)
}
