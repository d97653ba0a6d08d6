//! I/O abstraction layer for reading bytes from source files

pub mod byte_reader;
pub mod local_reader;

pub use byte_reader::{
    ByteReader, estimate_rows_in_range, find_next_record_boundary, sample_row_bytes,
};
pub use local_reader::LocalFileByteReader;
