use crate::extract::{
    AlignedRows, ClusteredRows, Observations, RowParser, MAX_REPORTED_MALFORMED,
};
use crate::io::{output_rows, until_err, write_rows, write_staged, OutputOrder};
use crate::resolve::ConsensusTable;
use crate::summary::{self, RunSummary, Variant};
use anyhow::Result;

/// Optional side outputs of a run
#[derive(Clone, Debug, Default)]
pub struct Reports {
    /// JSON run summary
    pub stats: Option<String>,
    /// per-cell barcode count table
    pub counts: Option<String>,
}

/// Resolves a read-to-barcode alignment, where each read name is `<read>_<cell_id>_<umi>`.
pub fn run_aligned(input: &str, output: &str, reports: &Reports) -> Result<RunSummary> {
    resolve_file(
        input,
        output,
        AlignedRows,
        Variant::Aligned,
        OutputOrder::FirstSeen,
        reports,
    )
}

/// Resolves clustered `<cell_id><umi><barcode>` sequences with read counts. The output is
/// sorted by barcode.
pub fn run_clustered(
    input: &str,
    output: &str,
    cb_umi_length: usize,
    cb_length: usize,
    reports: &Reports,
) -> Result<RunSummary> {
    let parser = ClusteredRows::new(cb_umi_length, cb_length)?;
    info!("Using cell barcode length {cb_length} and UMI length {}", cb_umi_length - cb_length);

    resolve_file(
        input,
        output,
        parser,
        Variant::Clustered,
        OutputOrder::Barcode,
        reports,
    )
}

fn resolve_file<P: RowParser>(
    input: &str,
    output: &str,
    parser: P,
    variant: Variant,
    order: OutputOrder,
    reports: &Reports,
) -> Result<RunSummary> {
    // time everything!
    let now = std::time::Instant::now();

    info!("Reading observations from {input}");
    let mut observations = Observations::from_path(input, parser)?;

    // Start with a placeholder error object. This will be mutated if a fatal error is found
    // while reading.
    let mut err = Ok(());
    let mut table = if observations.pre_counted() {
        ConsensusTable::pre_counted()
    } else {
        ConsensusTable::new()
    };
    table.extend(observations.by_ref().scan(&mut err, until_err));
    err?;

    let extract = observations.stats();
    if extract.rows_malformed > MAX_REPORTED_MALFORMED {
        warn!(
            "{} further malformed rows were skipped without a warning",
            extract.rows_malformed - MAX_REPORTED_MALFORMED
        );
    }
    if table.is_empty() {
        warn!("No usable rows in {input}, the output will be empty");
    }

    info!(
        "Resolving {} cell ID - UMI pairs from {} rows",
        table.keys(),
        extract.rows_parsed
    );
    let (records, resolution) = table.resolve();

    summary::print_progress(variant, &extract, &resolution);

    info!("Writing {} reads to {output}", records.len());
    let rows = output_rows(&records, order);
    write_staged(output, |w| write_rows(w, &rows))?;

    if let Some(path) = &reports.counts {
        summary::write_counts(path, &records)?;
    }

    let summary = RunSummary {
        version: crate::cli::VERSION.to_string(),
        date: format!("{:?}", chrono::offset::Local::now()),
        variant,
        input: input.to_string(),
        output: output.to_string(),
        extract,
        resolution,
        elapsed: now.elapsed().as_secs_f64(),
    };

    if let Some(path) = &reports.stats {
        summary::write_stats(path, &summary)?;
    }

    info!(
        "Stats: {} rows, {} reads kept, {:.1}s runtime",
        summary.extract.rows_read, summary.resolution.kept, summary.elapsed
    );

    Ok(summary)
}
