//! # Formats
//!
//! On-disk formats consumed and produced by the engine:
//! - `persistence`: binary index files (header + postcard payload)
//! - `runs`: TREC result lines and internal cascade staging lines
//! - `queries`: JSON / TSV query files
//!
//! These are pure transformations plus thin file helpers; nothing here
//! touches ranking state.

mod persistence;
mod queries;
mod runs;

pub use persistence::{IndexHeader, index_from_bytes, index_to_bytes, load_index, save_index};
pub use queries::{QueryRecord, load_queries, parse_json_queries, parse_tsv_queries};
pub use runs::{
    format_trec_line, parse_internal_run, read_internal_input_file, write_internal_results,
    write_trec_results,
};
