//! The dataset controller.
//!
//! A [`Dataset`] owns one layout, one stream and at most one page buffer. Reading datasets move
//! between [`DatasetState::Opened`] and [`DatasetState::PageRead`]; writing datasets go from
//! [`DatasetState::Defining`] to [`DatasetState::LayoutWritten`] and then alternate with
//! [`DatasetState::PageOpen`]. I/O and decoding failures leave the dataset
//! [`DatasetState::Errored`], after which only [`Dataset::terminate`] is accepted.

use std::fmt::{Display, Formatter};
use std::io::Write;

use log::{debug, trace};
use sdds_dtype::{TypedBuffer, Value};
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_io::{ByteOrder, Decoder, Encoder, Sink, Source};

use crate::codec::ascii::{self, AsciiField};
use crate::codec::{BlockOrder, ColumnMajor, RowMajor, RowSelection, binary};
use crate::header::write_header;
use crate::layout::{
    ArrayDefinition, AssociateDefinition, ColumnDefinition, DataMode, Layout, ParameterDefinition,
};
use crate::page::{ArrayValue, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetState {
    /// Open for reading with no page loaded.
    Opened,
    /// The given page has been read into the buffer.
    PageRead(usize),
    /// Open for writing; definitions can still be added.
    Defining,
    /// The header has been written and no page is open.
    LayoutWritten,
    /// The given page is being filled.
    PageOpen(usize),
    Errored,
}

impl Display for DatasetState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened => write!(f, "open for reading"),
            Self::PageRead(n) => write!(f, "holding page {n}"),
            Self::Defining => write!(f, "defining its layout"),
            Self::LayoutWritten => write!(f, "between pages"),
            Self::PageOpen(n) => write!(f, "writing page {n}"),
            Self::Errored => write!(f, "in an error state"),
        }
    }
}

/// What [`Dataset::update_page`] does after emitting the rows added so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Complete the page; the next rows go to a new page.
    Flush,
    /// Keep the page open for more rows.
    #[default]
    NoFlush,
}

enum Stream {
    Read(Source),
    Write(Sink),
}

/// What has been emitted of the open page.
#[derive(Debug, Clone, Copy)]
struct PageProgress {
    page_start: u64,
    count_offset: Option<u64>,
    rows_done: usize,
    emitted: usize,
    /// The bytes from `page_start` hold an older copy of the page and must be replaced.
    replace: bool,
}

pub struct Dataset {
    layout: Layout,
    state: DatasetState,
    stream: Stream,
    byte_order: ByteOrder,
    page: Option<Page>,
    pages: usize,
    progress: Option<PageProgress>,
    auto_recover: bool,
    non_native: bool,
    exhausted: bool,
}

impl Dataset {
    pub(crate) fn reader(layout: Layout, source: Source, auto_recover: bool, non_native: bool) -> Self {
        let byte_order = layout.data.effective_byte_order();
        Self {
            layout,
            state: DatasetState::Opened,
            stream: Stream::Read(source),
            byte_order,
            page: None,
            pages: 0,
            progress: None,
            auto_recover,
            non_native,
            exhausted: false,
        }
    }

    pub(crate) fn writer(layout: Layout, sink: Sink, byte_order: ByteOrder) -> Self {
        Self {
            layout,
            state: DatasetState::Defining,
            stream: Stream::Write(sink),
            byte_order,
            page: None,
            pages: 0,
            progress: None,
            auto_recover: false,
            non_native: false,
            exhausted: false,
        }
    }

    /// A writer positioned after `pages` existing pages, optionally reopening the last one.
    pub(crate) fn appender(
        layout: Layout,
        sink: Sink,
        byte_order: ByteOrder,
        pages: usize,
        last: Option<(u64, Page)>,
    ) -> Self {
        let mut dataset = Self::writer(layout, sink, byte_order);
        dataset.pages = pages;
        dataset.state = DatasetState::LayoutWritten;
        if let Some((page_start, mut page)) = last {
            page.freeze_rows(page.row_count());
            dataset.pages = pages.saturating_sub(1);
            dataset.state = DatasetState::PageOpen(page.number());
            dataset.progress = Some(PageProgress {
                page_start,
                count_offset: None,
                rows_done: 0,
                emitted: 0,
                replace: true,
            });
            dataset.page = Some(page);
        }
        dataset
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The layout, while definitions can still be changed.
    pub fn layout_mut(&mut self) -> SddsResult<&mut Layout> {
        self.check(|s| s == DatasetState::Defining, "changing the layout")?;
        Ok(&mut self.layout)
    }

    pub fn state(&self) -> DatasetState {
        self.state
    }

    /// Byte order of binary data on this dataset's stream.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// The page currently in the buffer.
    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub(crate) fn take_page(&mut self) -> Option<Page> {
        self.page.take()
    }

    /// Offset of the next unread byte of a reading dataset.
    pub(crate) fn source_position(&self) -> u64 {
        match &self.stream {
            Stream::Read(source) => source.position(),
            Stream::Write(sink) => sink.position(),
        }
    }

    fn check(&self, allowed: impl Fn(DatasetState) -> bool, op: &str) -> SddsResult<()> {
        if self.state == DatasetState::Errored {
            sdds_bail!(State: "{} after an earlier failure; only termination is allowed", op);
        }
        if !allowed(self.state) {
            sdds_bail!(State: "{} is not allowed while the dataset is {}", op, self.state);
        }
        Ok(())
    }

    /// Move to the error state if `result` failed.
    fn flag<T>(&mut self, result: SddsResult<T>) -> SddsResult<T> {
        if result.is_err() {
            self.state = DatasetState::Errored;
        }
        result
    }

    pub(crate) fn current_page(&self) -> SddsResult<&Page> {
        if self.state == DatasetState::Errored {
            sdds_bail!(State: "the dataset is in an error state");
        }
        self.page
            .as_ref()
            .ok_or_else(|| sdds_err!(State: "no page is loaded"))
    }

    pub(crate) fn current_page_mut(&mut self) -> SddsResult<&mut Page> {
        if self.state == DatasetState::Errored {
            sdds_bail!(State: "the dataset is in an error state");
        }
        self.page
            .as_mut()
            .ok_or_else(|| sdds_err!(State: "no page is loaded"))
    }

    // Reading

    /// Read the next page into the buffer, returning its 1-based number, or `None` once the
    /// data is exhausted.
    pub fn read_page(&mut self) -> SddsResult<Option<usize>> {
        self.read_with(RowSelection::ALL, self.non_native)
    }

    /// Read the next page keeping every `interval`-th row, at most `limit` rows when `limit > 0`.
    pub fn read_page_sparse(&mut self, interval: usize, limit: usize) -> SddsResult<Option<usize>> {
        self.read_with(RowSelection::sparse(interval, limit), self.non_native)
    }

    /// Read the next page decoding binary data in the byte order opposite to the declared one.
    pub fn read_non_native_page(&mut self) -> SddsResult<Option<usize>> {
        self.read_with(RowSelection::ALL, true)
    }

    fn read_with(&mut self, selection: RowSelection, swap: bool) -> SddsResult<Option<usize>> {
        self.check(
            |s| matches!(s, DatasetState::Opened | DatasetState::PageRead(_)),
            "reading a page",
        )?;
        self.page = None;
        if self.exhausted {
            self.state = DatasetState::Opened;
            return Ok(None);
        }
        let decoded = self.decode_page(selection, swap);
        match self.flag(decoded)? {
            Some((page, cut_short)) => {
                self.exhausted = cut_short;
                let number = page.number();
                trace!("read page {} with {} rows", number, page.row_count());
                self.pages = number;
                self.page = Some(page);
                self.state = DatasetState::PageRead(number);
                Ok(Some(number))
            }
            None => {
                debug!("end of data after {} pages", self.pages);
                self.exhausted = true;
                self.state = DatasetState::Opened;
                Ok(None)
            }
        }
    }

    fn decode_page(&mut self, selection: RowSelection, swap: bool) -> SddsResult<Option<(Page, bool)>> {
        let Stream::Read(source) = &mut self.stream else {
            sdds_bail!(State: "the dataset is not open for reading");
        };
        let layout = &self.layout;
        let number = self.pages + 1;
        let recover = self.auto_recover;
        match (layout.data.mode, layout.data.column_major) {
            (DataMode::Ascii, false) => {
                ascii::read_page::<RowMajor, _>(source, layout, number, selection, recover)
            }
            (DataMode::Ascii, true) => {
                ascii::read_page::<ColumnMajor, _>(source, layout, number, selection, recover)
            }
            (DataMode::Binary, column_major) => {
                if source.at_eof()? {
                    return Ok(None);
                }
                let order = if swap {
                    self.byte_order.opposite()
                } else {
                    self.byte_order
                };
                let mut decoder = Decoder::new(source, order);
                let page = if column_major {
                    binary::read_page::<ColumnMajor, _>(&mut decoder, layout, number, selection, recover)?
                } else {
                    binary::read_page::<RowMajor, _>(&mut decoder, layout, number, selection, recover)?
                };
                Ok(Some(page))
            }
        }
    }

    // Access

    /// Rows on the current page, or zero when no page is loaded.
    pub fn row_count(&self) -> usize {
        self.page.as_ref().map_or(0, Page::row_count)
    }

    pub fn get_parameter(&self, name: &str) -> SddsResult<&Value> {
        let idx = self.layout.require_parameter(name)?;
        Ok(self.current_page()?.parameter(idx))
    }

    pub fn get_parameter_as_f64(&self, name: &str) -> SddsResult<f64> {
        let value = self.get_parameter(name)?;
        value
            .as_f64()
            .ok_or_else(|| sdds_err!(TypeMismatch: "parameter {} is not numeric", name))
    }

    pub fn get_array(&self, name: &str) -> SddsResult<&ArrayValue> {
        let idx = self.layout.require_array(name)?;
        Ok(self.current_page()?.array(idx))
    }

    /// Every row of a column, including rows whose flag is clear.
    pub fn internal_column(&self, name: &str) -> SddsResult<&TypedBuffer> {
        let idx = self.layout.require_column(name)?;
        Ok(self.current_page()?.column(idx))
    }

    /// A copy of the flagged rows of a column.
    pub fn get_column(&self, name: &str) -> SddsResult<TypedBuffer> {
        let page = self.current_page()?;
        let column = self.internal_column(name)?;
        if page.row_flags().all_true() {
            return Ok(column.clone());
        }
        column.take(&page.rows_of_interest())
    }

    /// The flagged rows of a numeric column, converted to `f64`.
    pub fn get_column_as_f64(&self, name: &str) -> SddsResult<Vec<f64>> {
        self.get_column(name)?
            .to_f64_vec()
            .map_err(|e| e.with_context(format!("reading column {name}")))
    }

    pub fn get_value(&self, column: &str, row: usize) -> SddsResult<Value> {
        let buffer = self.internal_column(column)?;
        buffer
            .get(row)
            .ok_or_else(|| sdds_err!(OutOfRange: "row {} of column {} does not exist", row, column))
    }

    // Defining

    pub fn define_column(&mut self, def: ColumnDefinition) -> SddsResult<usize> {
        self.check(|s| s == DatasetState::Defining, "defining a column")?;
        self.layout.define_column(def)
    }

    pub fn define_parameter(&mut self, def: ParameterDefinition) -> SddsResult<usize> {
        self.check(|s| s == DatasetState::Defining, "defining a parameter")?;
        self.layout.define_parameter(def)
    }

    pub fn define_array(&mut self, def: ArrayDefinition) -> SddsResult<usize> {
        self.check(|s| s == DatasetState::Defining, "defining an array")?;
        self.layout.define_array(def)
    }

    pub fn define_associate(&mut self, def: AssociateDefinition) -> SddsResult<usize> {
        self.check(|s| s == DatasetState::Defining, "defining an associate")?;
        self.layout.define_associate(def)
    }

    /// Write the header. Definitions are frozen from here on.
    pub fn write_layout(&mut self) -> SddsResult<()> {
        self.check(|s| s == DatasetState::Defining, "writing the layout")?;
        let Stream::Write(sink) = &mut self.stream else {
            sdds_bail!(State: "the dataset is not open for writing");
        };
        let written = write_header(&self.layout, self.byte_order, sink);
        self.flag(written)?;
        self.layout.version = self.layout.required_version();
        self.state = DatasetState::LayoutWritten;
        Ok(())
    }

    // Writing

    /// Open a new page with room for `capacity` rows, returning its number.
    pub fn start_page(&mut self, capacity: usize) -> SddsResult<usize> {
        self.check(|s| s == DatasetState::LayoutWritten, "starting a page")?;
        let number = self.pages + 1;
        self.page = Some(Page::new(&self.layout, number, capacity)?);
        self.progress = None;
        self.state = DatasetState::PageOpen(number);
        trace!("started page {} with capacity {}", number, capacity);
        Ok(number)
    }

    /// Allow `delta` more rows on the current page.
    pub fn lengthen_table(&mut self, delta: usize) -> SddsResult<()> {
        self.current_page_mut()?.lengthen(delta);
        Ok(())
    }

    pub fn set_column(&mut self, name: &str, values: &TypedBuffer) -> SddsResult<()> {
        let idx = self.layout.require_column(name)?;
        self.current_page_mut()?.set_column(idx, values)
    }

    pub fn set_value(&mut self, column: &str, row: usize, value: impl Into<Value>) -> SddsResult<()> {
        let idx = self.layout.require_column(column)?;
        self.current_page_mut()?.set_value(row, idx, &value.into())
    }

    /// Store several cells of one row by column name.
    ///
    /// Every value is converted before any is stored, so a failure leaves the row untouched.
    pub fn set_row_values(&mut self, row: usize, values: &[(&str, Value)]) -> SddsResult<()> {
        let cells = values
            .iter()
            .map(|(name, value)| {
                let idx = self.layout.require_column(name)?;
                let converted = value
                    .cast(self.layout.columns[idx].stype)
                    .map_err(|e| e.with_context(format!("column {name}")))?;
                Ok((idx, converted))
            })
            .collect::<SddsResult<Vec<_>>>()?;
        let page = self.current_page_mut()?;
        for (idx, value) in &cells {
            page.set_value(row, *idx, value)?;
        }
        Ok(())
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> SddsResult<()> {
        let idx = self.layout.require_parameter(name)?;
        if self.layout.parameters[idx].fixed_value.is_some() {
            sdds_bail!(Usage: "parameter {} has a fixed value", name);
        }
        self.current_page_mut()?.set_parameter(idx, &value.into())
    }

    pub fn set_array(&mut self, name: &str, dimensions: Vec<usize>, data: TypedBuffer) -> SddsResult<()> {
        let idx = self.layout.require_array(name)?;
        let array = ArrayValue::new(dimensions, data)?;
        self.current_page_mut()?.set_array(idx, array)
    }

    /// Emit the open page and complete it.
    pub fn write_page(&mut self) -> SddsResult<()> {
        self.check(|s| matches!(s, DatasetState::PageOpen(_)), "writing a page")?;
        let emitted = self.emit(true);
        self.flag(emitted)?;
        self.complete_page();
        Ok(())
    }

    /// Emit the rows added to the open page since the last update.
    ///
    /// Row-major pages are extended in place and their row count rewritten; column-major pages
    /// are rewritten whole. Rows already emitted must not change afterwards.
    pub fn update_page(&mut self, mode: UpdateMode) -> SddsResult<()> {
        self.check(|s| matches!(s, DatasetState::PageOpen(_)), "updating a page")?;
        let finish = mode == UpdateMode::Flush;
        let emitted = self.emit(finish);
        self.flag(emitted)?;
        if finish {
            self.complete_page();
        } else if let Stream::Write(sink) = &mut self.stream {
            let flushed: SddsResult<()> = sink.flush().map_err(Into::into);
            self.flag(flushed)?;
        }
        Ok(())
    }

    fn complete_page(&mut self) {
        if let Some(page) = self.page.take() {
            debug!("wrote page {} with {} rows", page.number(), page.row_count());
            self.pages = page.number();
        }
        self.progress = None;
        self.state = DatasetState::LayoutWritten;
    }

    fn emit(&mut self, finish: bool) -> SddsResult<()> {
        let Stream::Write(sink) = &mut self.stream else {
            sdds_bail!(State: "the dataset is not open for writing");
        };
        let Some(page) = &self.page else {
            sdds_bail!(State: "no page is open");
        };
        let layout = &self.layout;
        let order = self.byte_order;
        let next = match self.progress.take() {
            Some(progress)
                if !layout.data.column_major
                    && !progress.replace
                    && page.row_count() >= progress.rows_done =>
            {
                extend_page(sink, layout, order, page, progress, finish)?
            }
            Some(progress) => {
                sink.truncate(progress.page_start)?;
                write_whole_page(sink, layout, order, page, finish)?
            }
            None => write_whole_page(sink, layout, order, page, finish)?,
        };
        if !finish {
            if let Some(page) = self.page.as_mut() {
                page.freeze_rows(next.rows_done);
            }
            self.progress = Some(next);
        }
        Ok(())
    }

    /// Finish with the dataset, writing the layout or an open page if still pending.
    pub fn terminate(self) -> SddsResult<()> {
        self.finish().map(drop)
    }

    /// Terminate an in-memory dataset and return what was written.
    pub fn into_bytes(self) -> SddsResult<Vec<u8>> {
        match self.finish()? {
            Some(Stream::Write(sink)) => sink
                .into_bytes()
                .ok_or_else(|| sdds_err!(State: "the dataset was not written to memory")),
            _ => sdds_bail!(State: "the dataset was not written to memory"),
        }
    }

    fn finish(mut self) -> SddsResult<Option<Stream>> {
        match self.state {
            DatasetState::Errored => {
                debug!("terminating a dataset after a failure");
                return Ok(None);
            }
            DatasetState::Defining => self.write_layout()?,
            DatasetState::PageOpen(_) => self.write_page()?,
            _ => {}
        }
        if let Stream::Write(sink) = &mut self.stream {
            sink.flush()?;
        }
        Ok(Some(self.stream))
    }
}

fn write_ascii_rows(layout: &Layout, page: &Page, rows: &[usize], out: &mut String) {
    let fields = AsciiField::of_layout(layout);
    let lines = layout.data.lines_per_row;
    if layout.data.column_major {
        ColumnMajor::write_ascii(out, &fields, page.columns(), rows, lines);
    } else {
        RowMajor::write_ascii(out, &fields, page.columns(), rows, lines);
    }
}

fn write_binary_rows(encoder: &mut Encoder, layout: &Layout, page: &Page, start: usize) -> SddsResult<()> {
    let end = page.row_count();
    if layout.data.column_major {
        ColumnMajor::write_binary(encoder, page.columns(), start, end)
    } else {
        RowMajor::write_binary(encoder, page.columns(), start, end)
    }
}

/// Emit a complete page at the sink's position. Pages that stay open get a rewritable count.
fn write_whole_page(
    sink: &mut Sink,
    layout: &Layout,
    order: ByteOrder,
    page: &Page,
    finish: bool,
) -> SddsResult<PageProgress> {
    let page_start = sink.position();
    let fixed = layout.data.fixed_row_count || !finish;
    let (count_offset, emitted) = match layout.data.mode {
        DataMode::Ascii => {
            let rows = page.rows_of_interest();
            let (mut text, offset) = ascii::page_prefix(layout, page, rows.len(), fixed)?;
            write_ascii_rows(layout, page, &rows, &mut text);
            if finish && layout.data.no_row_counts && !layout.data.column_major {
                text.push('\n');
            }
            sink.write_all(text.as_bytes())?;
            (offset.map(|o| page_start + o as u64), rows.len())
        }
        DataMode::Binary => {
            let mut encoder = Encoder::new(order);
            binary::write_prefix(&mut encoder, layout, page, page.row_count(), fixed)?;
            write_binary_rows(&mut encoder, layout, page, 0)?;
            encoder.flush_to(sink)?;
            (Some(page_start), page.row_count())
        }
    };
    Ok(PageProgress {
        page_start,
        count_offset,
        rows_done: page.row_count(),
        emitted,
        replace: false,
    })
}

/// Append the rows added since the last update and rewrite the page's row count.
fn extend_page(
    sink: &mut Sink,
    layout: &Layout,
    order: ByteOrder,
    page: &Page,
    progress: PageProgress,
    finish: bool,
) -> SddsResult<PageProgress> {
    let emitted = match layout.data.mode {
        DataMode::Ascii => {
            let rows: Vec<usize> = (progress.rows_done..page.row_count())
                .filter(|&row| page.row_flags().value(row))
                .collect();
            let mut text = String::new();
            write_ascii_rows(layout, page, &rows, &mut text);
            if finish && layout.data.no_row_counts {
                text.push('\n');
            }
            sink.write_all(text.as_bytes())?;
            progress.emitted + rows.len()
        }
        DataMode::Binary => {
            let mut encoder = Encoder::new(order);
            write_binary_rows(&mut encoder, layout, page, progress.rows_done)?;
            encoder.flush_to(sink)?;
            page.row_count()
        }
    };
    if let Some(offset) = progress.count_offset {
        let end = sink.position();
        sink.seek_to(offset)?;
        match layout.data.mode {
            DataMode::Ascii => sink.write_all(ascii::fixed_count_text(emitted).as_bytes())?,
            DataMode::Binary => {
                let mut encoder = Encoder::new(order);
                binary::put_row_count(&mut encoder, emitted, true)?;
                encoder.flush_to(sink)?;
            }
        }
        sink.seek_to(end)?;
    }
    trace!(
        "page {} extended to {} rows",
        page.number(),
        page.row_count()
    );
    Ok(PageProgress {
        rows_done: page.row_count(),
        emitted,
        ..progress
    })
}
