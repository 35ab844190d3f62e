use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

/// Marker columns of the Nilsson HSC table: `4..7` followed by `8..18`.
pub const MARKER_COLUMNS: &str = "4..7,8..18";

/// An ordered list of 0-based column indices.
///
/// The textual form is a comma separated list where every item is either a
/// single index (`5`) or a half-open range (`4..7`). Items keep their order,
/// so `8..10,0` selects columns 8, 9 and 0 in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    indices: Vec<usize>,
}

impl ColumnSet {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    /// Concatenation of half-open ranges, in order.
    pub fn from_ranges(ranges: &[std::ops::Range<usize>]) -> Self {
        let indices = ranges.iter().flat_map(|r| r.clone()).collect();
        Self { indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl Default for ColumnSet {
    fn default() -> Self {
        Self::from_ranges(&[4..7, 8..18])
    }
}

fn parse_index(item: &str, whole: &str) -> Result<usize> {
    let item = item.trim();
    if item.starts_with('-') {
        return Err(anyhow!("Negative column index {:?} in {:?}", item, whole));
    }
    item.parse::<usize>()
        .map_err(|e| anyhow!("Invalid column index {:?} in {:?}: {}", item, whole, e))
}

impl FromStr for ColumnSet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut indices = Vec::new();
        for item in s.split(',') {
            let item = item.trim();
            if item.is_empty() {
                return Err(anyhow!("Empty item in column list {:?}", s));
            }
            match item.split_once("..") {
                Some((start, end)) => {
                    let start = parse_index(start, s)?;
                    let end = parse_index(end, s)?;
                    if end <= start {
                        return Err(anyhow!("Empty column range {:?} in {:?}", item, s));
                    }
                    indices.extend(start..end);
                }
                None => indices.push(parse_index(item, s)?),
            }
        }
        Ok(Self { indices })
    }
}

impl fmt::Display for ColumnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.indices.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", items.join(","))
    }
}
