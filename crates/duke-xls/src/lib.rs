//! # duke-xls
//!
//! BIFF8 (.xls) record-stream engine.
//!
//! A workbook stream is a flat sequence of records. This crate reads it into
//! an [`InternalWorkbook`] (the globals, with their cross-references kept
//! consistent under edits) and one [`Sheet`] per worksheet, lets callers
//! change structure, and writes a stream Excel accepts again.
//!
//! ```no_run
//! use duke_xls::{WorkbookOptions, XlsDocument};
//!
//! let mut doc = XlsDocument::new(&WorkbookOptions::default())?;
//! doc.create_sheet("Data")?;
//! doc.workbook_mut().create_name("Total", 0)?;
//! doc.write_file("out.xls")?;
//! # Ok::<(), duke_xls::XlsError>(())
//! ```

pub mod document;
pub mod drawing;
pub mod error;
pub mod formula_shifter;
pub mod link_table;
pub mod options;
pub mod orderer;
pub mod password;
pub mod record_list;
pub mod sheet;
pub mod stream;
pub mod workbook;

pub use document::XlsDocument;
pub use error::{XlsError, XlsResult};
pub use options::WorkbookOptions;
pub use sheet::Sheet;
pub use workbook::InternalWorkbook;
