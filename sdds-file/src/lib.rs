#![allow(clippy::cast_possible_truncation)]
//! Read and write SDDS datasets.
//!
//! An SDDS file is self-describing: a text header declares the parameters, arrays and columns of
//! the data, and the data section holds a sequence of pages conforming to that layout. Each page
//! carries one value per parameter, one extent-prefixed block per array and a table of rows.
//!
//! # Reading
//!
//! Datasets are opened with [`SddsOpenOptions`], which parses the header and returns a
//! [`Dataset`] positioned at the first page. [`Dataset::read_page`] loads one page at a time into
//! the dataset's page buffer, where values are available by name.
//!
//! # Writing
//!
//! [`SddsWriteOptions`] creates a dataset in the definition state. Once every parameter, array and
//! column is defined, [`Dataset::write_layout`] emits the header, and each page is filled between
//! [`Dataset::start_page`] and [`Dataset::write_page`]. Long-running writers can publish partial
//! pages with [`Dataset::update_page`].
//!
//! # File Format
//!
//! ```text
//! ┌────────────────────────────┐
//! │ SDDS<version>              │
//! │ !# <byte order>            │
//! │ &description ... &end      │
//! │ &parameter ... &end        │
//! │ &array ... &end            │
//! │ &column ... &end           │
//! │ &data mode=... &end        │
//! ├────────────────────────────┤
//! │ Page 1                     │
//! │  row count                 │
//! │  parameter values          │
//! │  array extents and values  │
//! │  rows (row- or column-     │
//! │  major, ASCII or binary)   │
//! ├────────────────────────────┤
//! │ Page 2 ...                 │
//! └────────────────────────────┘
//! ```
//!
//! ASCII pages write parameters first and put the row count just before the rows; binary pages
//! lead with the row count. Binary values use the byte order declared by the header.

mod codec;
mod copy;
mod dataset;
mod header;
mod layout;
mod options;
mod page;
mod select;

pub use codec::RowSelection;
pub use copy::*;
pub use dataset::*;
pub use header::{read_header, write_header};
pub use layout::*;
pub use options::*;
pub use page::*;
pub use select::*;
