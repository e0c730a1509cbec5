//! # duke-xls-records
//!
//! BIFF8 record codecs for duke-xls.
//!
//! This crate knows the byte layout of records and nothing about how they
//! relate to each other:
//!
//! - [`stream`]: the physical record framing and CONTINUE handling
//! - [`record`]: the typed [`Record`] union and its decoder
//! - [`escher`]: the drawing-layer record tree
//! - [`formula`]: parsed-expression tokens, with a walker for 3-D references

pub mod error;
pub mod escher;
pub mod formula;
pub mod parser;
pub mod record;
pub mod sid;
pub mod stream;
pub mod strings;

pub use error::{RecordError, RecordResult};
pub use formula::Formula;
pub use record::Record;
pub use stream::{read_all_records, read_records_from_bytes, RawRecord};
