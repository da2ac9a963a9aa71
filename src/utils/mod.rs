//! Helpers shared by the experiment binaries.
//!
//! - **`data_loader`**: reads sparse test matrices in the Matrix Market coordinate
//!   format into [`faer::sparse::SparseColMat`].
//! - **`perf`**: reads the peak resident set size of the process on Linux, used by the
//!   scalability experiment to compare memory footprints across problem sizes.

pub mod data_loader;
pub mod perf;
