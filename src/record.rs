use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The (cell ID, UMI) pair which identifies one physical molecule. Every `Key` is resolved to at
/// most one barcode.
#[derive(Serialize, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Clone, Default)]
pub struct Key {
    pub cell_id: String,
    pub umi: String,
}

impl Key {
    pub fn new(cell_id: impl Into<String>, umi: impl Into<String>) -> Self {
        Key {
            cell_id: cell_id.into(),
            umi: umi.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.cell_id, self.umi)
    }
}

/// A single parsed input row, supported by `count` reads.
///
/// Rows from an alignment always carry a count of 1. Rows from a clustering tool carry the
/// number of reads the clustering tool collapsed into that sequence.
#[derive(PartialEq, Debug, Clone)]
pub struct Observation {
    pub key: Key,
    pub barcode: String,
    pub count: u64,
}

/// The surviving barcode of a `Key`, together with the number of reads which supported it.
#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct ResolvedRecord {
    pub key: Key,
    pub barcode: String,
    pub count: u64,
}

/// The read name written to the output, `<ordinal>_<umi>_<cell_id>`.
///
/// The downstream counting tool recovers the UMI and cell ID from the second and third
/// underscore-delimited fields, so this layout must not change.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SyntheticReadId {
    pub ordinal: usize,
    pub umi: String,
    pub cell_id: String,
}

impl SyntheticReadId {
    pub fn new(ordinal: usize, key: &Key) -> Self {
        SyntheticReadId {
            ordinal,
            umi: key.umi.clone(),
            cell_id: key.cell_id.clone(),
        }
    }

    pub fn key(&self) -> Key {
        Key::new(self.cell_id.as_str(), self.umi.as_str())
    }
}

/// See `FromStr` for the inverse.
impl fmt::Display for SyntheticReadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.ordinal, self.umi, self.cell_id)
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("invalid read name `{name}`: expected `<ordinal>_<umi>_<cell_id>`")]
pub struct ParseReadIdErr {
    pub name: String,
}

impl FromStr for SyntheticReadId {
    type Err = ParseReadIdErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseReadIdErr {
            name: s.to_string(),
        };

        // the cell ID is the remainder, so that it may itself contain an underscore
        let mut parts = s.splitn(3, '_');
        let ordinal = parts
            .next()
            .and_then(|x| x.parse::<usize>().ok())
            .ok_or_else(err)?;
        let umi = parts.next().filter(|x| !x.is_empty()).ok_or_else(err)?;
        let cell_id = parts.next().filter(|x| !x.is_empty()).ok_or_else(err)?;

        Ok(SyntheticReadId {
            ordinal,
            umi: umi.to_string(),
            cell_id: cell_id.to_string(),
        })
    }
}
