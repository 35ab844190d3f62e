use anyhow::{anyhow, Result};
use csv::{ReaderBuilder, Trim};
use ndarray::{Array2, Axis};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub mod columns;
pub mod graph;
pub mod knn;
pub mod louvain;
pub mod output;
pub mod phenograph;

pub use columns::ColumnSet;
pub use phenograph::{cluster, Clustering, PhenographParams};

/// Represents a numerical dataset loaded from a delimited text file
#[derive(Debug, Clone)]
pub struct DataSet {
    pub data: Array2<f32>,
    pub headers: Option<Vec<String>>,
}

impl DataSet {
    /// Read a TSV file with a single header line into a DataSet
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_delimited(path, b'\t', 1)
    }

    /// Read a delimited numeric file, discarding the first `skip_rows` lines.
    ///
    /// Every remaining field must parse as a number and every record must
    /// have the same number of fields. Lines starting with `#` are ignored.
    /// The first skipped line is kept as the header.
    pub fn from_delimited<P: AsRef<Path>>(path: P, delimiter: u8, skip_rows: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| anyhow!("Failed to open {:?}: {}", path, e))?;
        let mut reader = BufReader::new(file);

        let mut headers = None;
        for i in 0..skip_rows {
            let mut line = String::new();
            let n = reader
                .read_line(&mut line)
                .map_err(|e| anyhow!("Error reading header line {} of {:?}: {}", i, path, e))?;
            if n == 0 {
                return Err(anyhow!(
                    "{:?} ends after {} lines, expected {} header lines",
                    path, i, skip_rows
                ));
            }
            if i == 0 {
                let line = line.trim_end_matches(&['\n', '\r'][..]);
                headers = Some(
                    line.split(delimiter as char)
                        .map(|s| s.trim().to_string())
                        .collect::<Vec<_>>(),
                );
            }
        }

        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut flat: Vec<f32> = Vec::new();
        let mut ncols: Option<usize> = None;
        let mut nrows = 0usize;

        for (i, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| anyhow!("Error reading record {} of {:?}: {}", i, path, e))?;
            match ncols {
                None => ncols = Some(record.len()),
                Some(c) if c != record.len() => {
                    return Err(anyhow!(
                        "Record {} of {:?} has {} fields, expected {}",
                        i, path, record.len(), c
                    ));
                }
                Some(_) => {}
            }
            for (j, field) in record.iter().enumerate() {
                let value = field.parse::<f32>().map_err(|e| {
                    anyhow!("Non-numeric field {:?} in record {}, column {} of {:?}: {}", field, i, j, path, e)
                })?;
                flat.push(value);
            }
            nrows += 1;
        }

        let ncols = match ncols {
            Some(c) if nrows > 0 => c,
            _ => return Err(anyhow!("No data lines found in {:?}", path)),
        };
        let data = Array2::from_shape_vec((nrows, ncols), flat)?;
        log::info!("loaded {} rows x {} columns from {:?}", nrows, ncols, path);

        Ok(Self { data, headers })
    }

    /// Copy the given columns, in the given order, into a new matrix.
    pub fn select_columns(&self, columns: &[usize]) -> Result<Array2<f32>> {
        let width = self.data.ncols();
        if let Some(&bad) = columns.iter().find(|&&c| c >= width) {
            return Err(anyhow!(
                "Column index {} out of range for a matrix with {} columns",
                bad, width
            ));
        }
        Ok(self.data.select(Axis(1), columns))
    }

    /// Names of the selected columns, if a header was read.
    pub fn column_names(&self, columns: &[usize]) -> Option<Vec<String>> {
        let headers = self.headers.as_ref()?;
        columns.iter().map(|&c| headers.get(c).cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array2};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_tmp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write temp file");
        file
    }

    #[test]
    fn test_shape_after_header_skip() {
        let file = write_tmp("a\tb\tc\n1\t2\t3\n4\t5\t6\n7.5\t-8\t9e1\n10\t11\t12\n");
        let ds = DataSet::from_tsv(file.path()).unwrap();
        assert_eq!(ds.data.dim(), (4, 3));
        assert_eq!(ds.data[[2, 0]], 7.5);
        assert_eq!(ds.data[[2, 2]], 90.0);
        assert_eq!(ds.headers, Some(vec!["a".to_string(), "b".to_string(), "c".to_string()]));
    }

    #[test]
    fn test_multiple_header_rows() {
        let file = write_tmp("x,y\nunits\n1,2\n3,4\n");
        let ds = DataSet::from_delimited(file.path(), b',', 2).unwrap();
        assert_eq!(ds.data.dim(), (2, 2));
        assert_eq!(ds.data[[1, 1]], 4.0);
    }

    #[test]
    fn test_ragged_rows_fail() {
        let file = write_tmp("h1\th2\n1\t2\n3\n");
        assert!(DataSet::from_tsv(file.path()).is_err());
    }

    #[test]
    fn test_non_numeric_fails() {
        let file = write_tmp("h1\th2\n1\t2\n3\tabc\n");
        let err = DataSet::from_tsv(file.path()).unwrap_err();
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_hash_lines_are_skipped() {
        let file = write_tmp("#h1\th2\n# comment\n1\t2\n#3\t4\n5\t6\n");
        let ds = DataSet::from_tsv(file.path()).unwrap();
        // the header line is skipped by count, later '#' lines as comments
        assert_eq!(ds.data.dim(), (2, 2));
        assert_eq!(ds.data[[1, 0]], 5.0);
        assert_eq!(ds.headers, Some(vec!["#h1".to_string(), "h2".to_string()]));
    }

    #[test]
    fn test_missing_and_empty_files_fail() {
        assert!(DataSet::from_tsv("/definitely/not/here.txt").is_err());
        let header_only = write_tmp("h1\th2\n");
        assert!(DataSet::from_tsv(header_only.path()).is_err());
        let empty = write_tmp("");
        assert!(DataSet::from_tsv(empty.path()).is_err());
    }

    #[test]
    fn test_select_marker_columns() {
        // column j of row i holds 100 * j + i
        let data = Array2::from_shape_fn((20, 18), |(i, j)| (100 * j + i) as f32);
        let ds = DataSet { data, headers: None };
        let cols = ColumnSet::default();
        let selected = ds.select_columns(cols.indices()).unwrap();
        assert_eq!(selected.dim(), (20, 13));
        for (out_col, &src_col) in cols.indices().iter().enumerate() {
            assert_eq!(selected.column(out_col), ds.data.column(src_col));
        }
        assert_eq!(selected.slice(s![.., 0..3]), ds.data.slice(s![.., 4..7]));
        assert_eq!(selected.slice(s![.., 3..]), ds.data.slice(s![.., 8..18]));
    }

    #[test]
    fn test_select_out_of_range_fails() {
        let ds = DataSet { data: Array2::zeros((3, 5)), headers: None };
        assert!(ds.select_columns(&[0, 4]).is_ok());
        let err = ds.select_columns(&[1, 5]).unwrap_err();
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn test_column_names() {
        let file = write_tmp("a\tb\tc\n1\t2\t3\n");
        let ds = DataSet::from_tsv(file.path()).unwrap();
        assert_eq!(ds.column_names(&[2, 0]), Some(vec!["c".to_string(), "a".to_string()]));
        assert_eq!(ds.column_names(&[3]), None);
    }
}
