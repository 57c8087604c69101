use crate::extract::ExtractStats;
use crate::io::write_staged;
use crate::record::ResolvedRecord;
use crate::resolve::ResolutionStats;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use itertools::Itertools;
use serde::Serialize;
use std::io::Write;

/// The two kinds of input accepted
#[derive(Serialize, Copy, Clone, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// read-to-barcode alignments, one read per row
    Aligned,
    /// clustered sequences with a read count per row
    Clustered,
}

/// Everything known about a completed run, written by `--stats`.
#[derive(Serialize, Debug)]
pub struct RunSummary {
    pub version: String,
    pub date: String,
    pub variant: Variant,
    pub input: String,
    pub output: String,
    #[serde(flatten)]
    pub extract: ExtractStats,
    #[serde(flatten)]
    pub resolution: ResolutionStats,
    pub elapsed: f64,
}

/// Prints the number of combinations removed at each step to standard output.
pub fn print_progress(variant: Variant, extract: &ExtractStats, resolution: &ResolutionStats) {
    println!("############ Clean PCR chimerism ############\n");

    match variant {
        Variant::Aligned => {
            println!("Parsed {} reads", extract.rows_parsed);
            println!(
                "Counted {} cell ID - UMI - barcode combinations",
                resolution.combinations
            );
        }
        Variant::Clustered => {
            println!(
                "Parsed {} cell ID - UMI - barcode combinations",
                extract.rows_parsed
            );
        }
    }

    if extract.rows_malformed > 0 {
        println!("Skipped {} malformed rows", extract.rows_malformed);
    }

    println!(
        "Removed {} cell ID - UMI - barcode combinations without max count, kept {}",
        resolution.removed_not_max, resolution.kept_max
    );
    println!(
        "Removed {} cell ID - UMI - barcode combinations with count ties, kept {}\n",
        resolution.removed_ties, resolution.kept
    );
}

pub fn write_stats(path: &str, summary: &RunSummary) -> Result<()> {
    info!("Writing run summary to {path}");

    write_staged(path, |w| {
        serde_json::to_writer_pretty(&mut *w, summary).context("Could not serialize summary")?;
        writeln!(w)?;
        Ok(())
    })
}

#[derive(Serialize, Debug, PartialEq)]
pub struct CellCount<'a> {
    pub gene: &'a str,
    pub cell: &'a str,
    pub count: usize,
}

/// Counts the resolved molecules of every (barcode, cell) pair, sorted by barcode and then cell.
pub fn count_cells(records: &[ResolvedRecord]) -> Vec<CellCount<'_>> {
    records
        .iter()
        .map(|r| (r.barcode.as_str(), r.key.cell_id.as_str()))
        .counts()
        .into_iter()
        .sorted()
        .map(|((gene, cell), count)| CellCount { gene, cell, count })
        .collect()
}

pub fn write_counts(path: &str, records: &[ResolvedRecord]) -> Result<()> {
    let counts = count_cells(records);
    info!("Writing {} per-cell barcode counts to {path}", counts.len());

    write_staged(path, |w| {
        let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(w);
        for count in counts.iter() {
            wtr.serialize(count)?;
        }
        wtr.flush()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Key;

    fn record(cell_id: &str, umi: &str, barcode: &str) -> ResolvedRecord {
        ResolvedRecord {
            key: Key::new(cell_id, umi),
            barcode: barcode.to_string(),
            count: 2,
        }
    }

    #[test]
    fn counts_molecules_per_cell() {
        let records = vec![
            record("C2", "U1", "BC1"),
            record("C1", "U1", "BC2"),
            record("C1", "U2", "BC1"),
            record("C1", "U3", "BC1"),
        ];

        assert_eq!(
            count_cells(&records),
            vec![
                CellCount { gene: "BC1", cell: "C1", count: 2 },
                CellCount { gene: "BC1", cell: "C2", count: 1 },
                CellCount { gene: "BC2", cell: "C1", count: 1 },
            ]
        );
    }

    #[test]
    fn counts_table_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.tsv");
        let path = path.to_str().unwrap();

        write_counts(path, &[record("C1", "U1", "BC1")]).unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "gene\tcell\tcount\nBC1\tC1\t1\n"
        );
    }

    #[test]
    fn empty_counts_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.tsv");
        let path = path.to_str().unwrap();

        write_counts(path, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "");
    }

    #[test]
    fn summary_is_flat_json() {
        let summary = RunSummary {
            version: "0.1.0".to_string(),
            date: String::new(),
            variant: Variant::Clustered,
            input: "in.tsv".to_string(),
            output: "out.tsv".to_string(),
            extract: ExtractStats {
                rows_read: 3,
                rows_parsed: 2,
                rows_malformed: 1,
            },
            resolution: ResolutionStats::default(),
            elapsed: 0.0,
        };

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["variant"], "clustered");
        assert_eq!(value["rows_malformed"], 1);
        assert_eq!(value["kept"], 0);
    }
}
