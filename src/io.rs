use crate::record::{ResolvedRecord, SyntheticReadId};
use anyhow::{Context, Result};
use csv::{QuoteStyle, WriterBuilder};
use itertools::Itertools;
#[cfg(unix)]
use std::fs::Permissions;
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use tempfile::{Builder, NamedTempFile};

/// The order in which resolved records are written.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OutputOrder {
    /// The order in which each key first appeared in the input
    FirstSeen,
    /// Ascending by barcode, as required by streaming per-cell counting tools. Records with the
    /// same barcode are ordered by cell ID and then UMI.
    Barcode,
}

pub struct OutputRow {
    pub read_id: SyntheticReadId,
    pub barcode: String,
}

/// Orders the resolved records and numbers them from 0 in that order.
pub fn output_rows(records: &[ResolvedRecord], order: OutputOrder) -> Vec<OutputRow> {
    let ordered: Vec<&ResolvedRecord> = match order {
        OutputOrder::FirstSeen => records.iter().collect(),
        OutputOrder::Barcode => records
            .iter()
            .sorted_by(|a, b| a.barcode.cmp(&b.barcode).then_with(|| a.key.cmp(&b.key)))
            .collect(),
    };

    ordered
        .into_iter()
        .enumerate()
        .map(|(ordinal, record)| OutputRow {
            read_id: SyntheticReadId::new(ordinal, &record.key),
            barcode: record.barcode.clone(),
        })
        .collect()
}

/// Writes `<read_id>\t<barcode>` lines without a header.
pub fn write_rows(writer: &mut impl Write, rows: &[OutputRow]) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .from_writer(writer);

    for row in rows {
        wtr.write_record([row.read_id.to_string().as_str(), row.barcode.as_str()])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes a file through a temporary file in the same directory, which only replaces `path`
/// once `write` has completed successfully. On failure nothing is left at `path`.
pub fn write_staged<F>(path: &str, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<()>,
{
    let mut dir = std::path::absolute(path)
        .with_context(|| format!("Invalid output path {path}"))?;
    dir.pop();

    // a plain temporary file is private to the user, which would carry over to `path`
    let mut builder = Builder::new();
    #[cfg(unix)]
    builder.permissions(Permissions::from_mode(0o644));

    let mut temp_file = builder
        .tempfile_in(&dir)
        .with_context(|| format!("Unable to create a temporary file in {}", dir.display()))?;

    {
        let mut writer = BufWriter::new(&mut temp_file);
        write(&mut writer)?;
        writer
            .flush()
            .with_context(|| format!("Unable to write to {path}"))?;
    }

    temp_file
        .persist(path)
        .with_context(|| format!("Unable to write output file {path}"))?;

    Ok(())
}

/// Utility function to extract the error from an iterator and stop iteration immediately. Useful
/// for iterators which yield a Result<T>.
///
/// # Returns
///
/// This function returns an `Option<T>`. If the item is `Ok`, it returns `Some(T)`.
/// If the item is `Err`, it updates `err` with the error and returns `None`.
///
/// # Example
/// ```
/// use anyhow::anyhow;
/// use dechimera::io::until_err;
///
/// let mut err = Ok(());
/// let items = vec![Ok(1), Ok(2), Err(anyhow!("error")), Ok(3)];
/// let results: Vec<_> = items
///   .into_iter()
///   .scan(&mut err, until_err)
///   .collect();
/// assert_eq!(results, vec![1, 2]);
/// assert!(err.is_err());
/// ```
pub fn until_err<T>(err: &mut &mut Result<()>, item: Result<T>) -> Option<T> {
    match item {
        Ok(item) => Some(item),
        Err(e) => {
            **err = Err(e);
            None
        }
    }
}
