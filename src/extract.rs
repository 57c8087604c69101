use crate::record::{Key, Observation};
use anyhow::{Context, Result};
use csv::{ByteRecord, ByteRecordsIntoIter, ReaderBuilder};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use thiserror::Error;

/// Only the first few malformed rows are logged individually
pub const MAX_REPORTED_MALFORMED: usize = 10;

const PROGRESS_INTERVAL: usize = 1_000_000;

#[derive(Error, Debug, PartialEq)]
pub enum ExtractErr {
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },
}

impl ExtractErr {
    /// Whether the whole run must stop. Malformed rows are skipped instead.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractErr::Configuration { .. })
    }
}

/// Converts one tab-separated input row into an `Observation`.
pub trait RowParser {
    /// Lines starting with this byte are skipped entirely
    fn comment(&self) -> Option<u8> {
        None
    }

    /// Whether each row already carries the final read count of its sequence, so that rows
    /// must not be summed together
    fn pre_counted(&self) -> bool {
        false
    }

    fn parse(&self, row: &ByteRecord, line: u64) -> Result<Observation, ExtractErr>;
}

/// Decodes column `index` of `row`. Only the columns a parser uses are decoded, so invalid UTF-8
/// elsewhere in the row (e.g. in SAM optional tags) is ignored.
fn field(row: &ByteRecord, index: usize, line: u64) -> Result<Option<&str>, ExtractErr> {
    row.get(index)
        .map(|bytes| {
            std::str::from_utf8(bytes).map_err(|_| ExtractErr::MalformedRecord {
                line,
                reason: format!("column {} is not valid UTF-8", index + 1),
            })
        })
        .transpose()
}

/// Rows of a read-to-barcode alignment. The read name in column 0 is formatted as
/// `<read>_<cell_id>_<umi>` and the barcode is the reference name in column 2. Header lines
/// beginning with `@` are ignored.
#[derive(Copy, Clone, Debug, Default)]
pub struct AlignedRows;

impl RowParser for AlignedRows {
    fn comment(&self) -> Option<u8> {
        Some(b'@')
    }

    fn parse(&self, row: &ByteRecord, line: u64) -> Result<Observation, ExtractErr> {
        let (Some(read_name), Some(barcode)) = (field(row, 0, line)?, field(row, 2, line)?) else {
            return Err(ExtractErr::MalformedRecord {
                line,
                reason: format!("expected at least 3 columns, found {}", row.len()),
            });
        };

        let parts: Vec<&str> = read_name.split('_').collect();
        let [read, cell_id, umi] = parts.as_slice() else {
            return Err(ExtractErr::MalformedRecord {
                line,
                reason: format!(
                    "read name `{read_name}` has {} underscore-separated fields, expected `<read>_<cell_id>_<umi>`",
                    parts.len()
                ),
            });
        };

        if read.is_empty() || cell_id.is_empty() || umi.is_empty() || barcode.is_empty() {
            return Err(ExtractErr::MalformedRecord {
                line,
                reason: format!("empty field in read name `{read_name}` or barcode `{barcode}`"),
            });
        }

        Ok(Observation {
            key: Key::new(*cell_id, *umi),
            barcode: barcode.to_string(),
            count: 1,
        })
    }
}

/// Rows of a sequence clustering output: a concatenated `<cell_id><umi><barcode>` sequence in
/// column 0 and its read count in column 1.
#[derive(Copy, Clone, Debug)]
pub struct ClusteredRows {
    /// length of the cell ID and UMI together
    pub cb_umi_length: usize,
    /// length of the cell ID alone
    pub cb_length: usize,
}

impl ClusteredRows {
    pub fn new(cb_umi_length: usize, cb_length: usize) -> Result<Self, ExtractErr> {
        if cb_length == 0 || cb_length >= cb_umi_length {
            return Err(ExtractErr::Configuration {
                reason: indoc::formatdoc! {"
                    cell barcode length ({cb_length}) must be greater than 0 and smaller \
                    than the combined cell barcode and UMI length ({cb_umi_length})"
                },
            });
        }

        Ok(ClusteredRows {
            cb_umi_length,
            cb_length,
        })
    }

    /// Split a sequence into its cell ID, UMI and barcode.
    pub fn split<'a>(&self, sequence: &'a str) -> Option<(&'a str, &'a str, &'a str)> {
        Some((
            sequence.get(..self.cb_length)?,
            sequence.get(self.cb_length..self.cb_umi_length)?,
            sequence.get(self.cb_umi_length..)?,
        ))
    }
}

impl RowParser for ClusteredRows {
    fn pre_counted(&self) -> bool {
        true
    }

    fn parse(&self, row: &ByteRecord, line: u64) -> Result<Observation, ExtractErr> {
        let sequence = row.get(0).unwrap_or_default();

        // the length is a run parameter, so this is checked before anything row-specific
        if sequence.len() < self.cb_umi_length {
            return Err(ExtractErr::Configuration {
                reason: format!(
                    "sequence `{}` at line {line} has length {}, which is shorter than \
                    the combined cell barcode and UMI length ({})",
                    String::from_utf8_lossy(sequence),
                    sequence.len(),
                    self.cb_umi_length
                ),
            });
        }

        let (Some(sequence), Some(count)) = (field(row, 0, line)?, field(row, 1, line)?) else {
            return Err(ExtractErr::MalformedRecord {
                line,
                reason: format!("expected 2 columns, found {}", row.len()),
            });
        };

        let count = count
            .trim()
            .parse::<u64>()
            .map_err(|_| ExtractErr::MalformedRecord {
                line,
                reason: format!("count `{count}` is not a non-negative integer"),
            })?;

        let Some((cell_id, umi, barcode)) = self.split(sequence) else {
            return Err(ExtractErr::MalformedRecord {
                line,
                reason: format!("sequence `{sequence}` is not ASCII"),
            });
        };

        if barcode.is_empty() {
            return Err(ExtractErr::MalformedRecord {
                line,
                reason: format!("sequence `{sequence}` has no barcode after the cell ID and UMI"),
            });
        }

        Ok(Observation {
            key: Key::new(cell_id, umi),
            barcode: barcode.to_string(),
            count,
        })
    }
}

#[derive(Serialize, Copy, Clone, Debug, Default, PartialEq)]
pub struct ExtractStats {
    /// rows read from the input, excluding comment lines
    pub rows_read: usize,
    pub rows_parsed: usize,
    pub rows_malformed: usize,
}

/// Iterates over the `Observation`s of a tab-separated input.
///
/// Malformed rows are logged and skipped. Fatal errors (unreadable input, invalid
/// configuration) are yielded as `Some(Err)`, after which the caller should stop. See
/// `crate::io::until_err`.
pub struct Observations<R: Read, P: RowParser> {
    records: ByteRecordsIntoIter<R>,
    parser: P,
    stats: ExtractStats,
}

impl<P: RowParser> Observations<BufReader<File>, P> {
    pub fn from_path(path: &str, parser: P) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Unable to open file {path}"))?;
        Ok(Self::from_reader(BufReader::new(file), parser))
    }
}

impl<R: Read, P: RowParser> Observations<R, P> {
    pub fn from_reader(reader: R, parser: P) -> Self {
        // quoting is disabled as SAM quality strings may contain `"`
        let records = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .comment(parser.comment())
            .from_reader(reader)
            .into_byte_records();

        Observations {
            records,
            parser,
            stats: ExtractStats::default(),
        }
    }

    pub fn stats(&self) -> ExtractStats {
        self.stats
    }

    pub fn pre_counted(&self) -> bool {
        self.parser.pre_counted()
    }
}

impl<R: Read, P: RowParser> Iterator for Observations<R, P> {
    type Item = Result<Observation>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.records.next()? {
                Ok(row) => row,
                Err(e) => {
                    return Some(Err(anyhow::Error::new(e).context("Could not read input row")))
                }
            };

            self.stats.rows_read += 1;
            if self.stats.rows_read % PROGRESS_INTERVAL == 0 {
                info!("Processed: {}", self.stats.rows_read);
            }

            let line = row
                .position()
                .map(|p| p.line())
                .unwrap_or(self.stats.rows_read as u64);

            match self.parser.parse(&row, line) {
                Ok(observation) => {
                    self.stats.rows_parsed += 1;
                    return Some(Ok(observation));
                }
                Err(e) if e.is_fatal() => return Some(Err(e.into())),
                Err(e) => {
                    self.stats.rows_malformed += 1;
                    if self.stats.rows_malformed <= MAX_REPORTED_MALFORMED {
                        warn!("Skipping {e}");
                    }
                }
            }
        }
    }
}
