//! This module provides utilities for loading test matrices from files.
//!
//! It reads the coordinate variant of the Matrix Market exchange format, the de-facto
//! format of public sparse matrix collections, into a [`SparseColMat`]. Only real
//! matrices are supported, with either `general` or `symmetric` storage. Symmetric files
//! list the lower triangle only, so off-diagonal entries are mirrored on load.

use faer::sparse::{SparseColMat, Triplet};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};
use thiserror::Error;

/// Represents all possible errors that can occur during data loading and parsing.
#[derive(Error, Debug)]
pub enum DataLoaderError {
    /// Wraps a standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Occurs when a string cannot be parsed into an integer.
    #[error("Parse error: Failed to parse integer from '{0}'")]
    ParseInt(String),
    /// Occurs when a string cannot be parsed into a float.
    #[error("Parse error: Failed to parse float from '{0}'")]
    ParseFloat(String),
    /// Occurs if the `%%MatrixMarket` banner is missing or describes an unsupported matrix.
    #[error("Format error: unsupported or missing Matrix Market header: '{0}'")]
    UnsupportedHeader(String),
    /// Occurs if the size line (`rows cols nnz`) is missing or malformed.
    #[error("Format error: The size line was not found or was malformed.")]
    SizeLineMissing,
    /// Occurs when an entry line has fewer than three fields.
    #[error("Format error: Unexpected entry line: '{0}'")]
    UnexpectedEntry(String),
    /// Occurs when an entry lies outside the declared dimensions.
    #[error("Format error: entry ({row}, {col}) lies outside a {nrows}x{ncols} matrix.")]
    EntryOutOfBounds {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },
    /// Occurs if the number of entries does not match the size line.
    #[error("Dimension mismatch: size line declares {declared} entries, but file has {found}.")]
    EntryCountMismatch { declared: usize, found: usize },
    /// Occurs if the sparse matrix construction fails internally.
    #[error("Internal error: Failed to construct the sparse matrix from triplets.")]
    SparseMatrixConstructionError,
}

/// Storage scheme declared in the Matrix Market banner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Symmetry {
    General,
    Symmetric,
}

/// Parses the `%%MatrixMarket matrix coordinate real <symmetry>` banner.
fn parse_header(line: &str) -> Result<Symmetry, DataLoaderError> {
    let parts: Vec<String> = line.split_whitespace().map(str::to_lowercase).collect();
    let unsupported = || DataLoaderError::UnsupportedHeader(line.to_string());
    if parts.len() != 5
        || parts[0] != "%%matrixmarket"
        || parts[1] != "matrix"
        || parts[2] != "coordinate"
        || !(parts[3] == "real" || parts[3] == "integer")
    {
        return Err(unsupported());
    }
    match parts[4].as_str() {
        "general" => Ok(Symmetry::General),
        "symmetric" => Ok(Symmetry::Symmetric),
        _ => Err(unsupported()),
    }
}

fn parse_index(token: &str) -> Result<usize, DataLoaderError> {
    token
        .parse::<usize>()
        .map_err(|_| DataLoaderError::ParseInt(token.to_string()))
}

/// Reads a Matrix Market coordinate file into a sparse column-major matrix.
///
/// # Arguments
/// * `path`: The path to the `.mtx` file.
///
/// # Returns
/// The assembled matrix. Duplicate entries are summed.
pub fn load_matrix_market(
    path: impl AsRef<Path>,
) -> Result<SparseColMat<usize, f64>, DataLoaderError> {
    let file = File::open(path)?;
    read_matrix_market(BufReader::new(file))
}

/// Same as [`load_matrix_market`], reading from any buffered source.
pub fn read_matrix_market(
    reader: impl BufRead,
) -> Result<SparseColMat<usize, f64>, DataLoaderError> {
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| DataLoaderError::UnsupportedHeader(String::new()))??;
    let symmetry = parse_header(&header)?;

    let mut size: Option<(usize, usize, usize)> = None;
    let mut triplets: Vec<Triplet<usize, usize, f64>> = Vec::new();
    let mut found = 0;

    for line in lines {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        // Comment and blank lines are allowed anywhere after the banner.
        if parts.is_empty() || parts[0].starts_with('%') {
            continue;
        }

        let Some((nrows, ncols, _)) = size else {
            if parts.len() != 3 {
                return Err(DataLoaderError::SizeLineMissing);
            }
            let nrows = parse_index(parts[0])?;
            let ncols = parse_index(parts[1])?;
            let nnz = parse_index(parts[2])?;
            triplets.reserve(if symmetry == Symmetry::Symmetric { 2 * nnz } else { nnz });
            size = Some((nrows, ncols, nnz));
            continue;
        };

        if parts.len() < 3 {
            return Err(DataLoaderError::UnexpectedEntry(line.clone()));
        }
        // Indices in Matrix Market files are 1-based.
        let row = parse_index(parts[0])?;
        let col = parse_index(parts[1])?;
        if row == 0 || col == 0 || row > nrows || col > ncols {
            return Err(DataLoaderError::EntryOutOfBounds {
                row,
                col,
                nrows,
                ncols,
            });
        }
        let val: f64 = parts[2]
            .parse::<f64>()
            .map_err(|_| DataLoaderError::ParseFloat(parts[2].to_string()))?;

        triplets.push(Triplet {
            row: row - 1,
            col: col - 1,
            val,
        });
        if symmetry == Symmetry::Symmetric && row != col {
            triplets.push(Triplet {
                row: col - 1,
                col: row - 1,
                val,
            });
        }
        found += 1;
    }

    let (nrows, ncols, declared) = size.ok_or(DataLoaderError::SizeLineMissing)?;
    if found != declared {
        return Err(DataLoaderError::EntryCountMismatch { declared, found });
    }

    SparseColMat::try_new_from_triplets(nrows, ncols, &triplets)
        .map_err(|_| DataLoaderError::SparseMatrixConstructionError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_general_matrix() {
        let text = "%%MatrixMarket matrix coordinate real general\n\
                    % a comment\n\
                    3 2 3\n\
                    1 1 1.5\n\
                    3 1 -2.0\n\
                    2 2 4.0\n";
        let a = read_matrix_market(Cursor::new(text)).unwrap();
        assert_eq!(a.nrows(), 3);
        assert_eq!(a.ncols(), 2);
        let dense = a.to_dense();
        assert_eq!(dense[(0, 0)], 1.5);
        assert_eq!(dense[(2, 0)], -2.0);
        assert_eq!(dense[(1, 1)], 4.0);
        assert_eq!(dense[(0, 1)], 0.0);
    }

    #[test]
    fn test_mirrors_symmetric_entries() {
        let text = "%%MatrixMarket matrix coordinate real symmetric\n\
                    2 2 2\n\
                    1 1 2.0\n\
                    2 1 3.0\n";
        let dense = read_matrix_market(Cursor::new(text)).unwrap().to_dense();
        assert_eq!(dense[(1, 0)], 3.0);
        assert_eq!(dense[(0, 1)], 3.0);
        assert_eq!(dense[(1, 1)], 0.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        let complex = "%%MatrixMarket matrix coordinate complex general\n1 1 1\n1 1 1 0\n";
        assert!(matches!(
            read_matrix_market(Cursor::new(complex)),
            Err(DataLoaderError::UnsupportedHeader(_))
        ));

        let out_of_bounds = "%%MatrixMarket matrix coordinate real general\n2 2 1\n3 1 1.0\n";
        assert!(matches!(
            read_matrix_market(Cursor::new(out_of_bounds)),
            Err(DataLoaderError::EntryOutOfBounds { row: 3, .. })
        ));

        let short = "%%MatrixMarket matrix coordinate real general\n2 2 2\n1 1 1.0\n";
        assert!(matches!(
            read_matrix_market(Cursor::new(short)),
            Err(DataLoaderError::EntryCountMismatch {
                declared: 2,
                found: 1
            })
        ));
    }
}
