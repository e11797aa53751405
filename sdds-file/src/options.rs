use std::path::{Path, PathBuf};

use log::debug;
use sdds_error::SddsResult;
use sdds_io::{ByteOrder, EngineConfig, Sink, Source};

use crate::dataset::Dataset;
use crate::header::read_header;
use crate::layout::{DataMode, Layout};

/// Where a dataset reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputTarget {
    File(PathBuf),
    Stdin,
}

/// Where a dataset writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    Stdout,
    Memory,
}

/// Options for opening a dataset for reading.
#[derive(Debug, Clone, Default)]
pub struct SddsOpenOptions {
    auto_recover: bool,
    non_native: bool,
}

impl SddsOpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the complete rows of a truncated page instead of failing.
    pub fn auto_recover(mut self, auto_recover: bool) -> Self {
        self.auto_recover = auto_recover;
        self
    }

    /// Decode binary data in the byte order opposite to the one the header declares.
    pub fn non_native(mut self, non_native: bool) -> Self {
        self.non_native = non_native;
        self
    }

    pub fn open(self, path: impl AsRef<Path>) -> SddsResult<Dataset> {
        let path = path.as_ref();
        let source = Source::open(path)?;
        self.open_source(source, path.parent())
    }

    pub fn open_stdin(self) -> SddsResult<Dataset> {
        self.open_source(Source::stdin(), None)
    }

    pub fn open_bytes(self, bytes: impl Into<Vec<u8>>) -> SddsResult<Dataset> {
        self.open_source(Source::memory(bytes), None)
    }

    pub fn open_target(self, target: &InputTarget) -> SddsResult<Dataset> {
        match target {
            InputTarget::File(path) => self.open(path),
            InputTarget::Stdin => self.open_stdin(),
        }
    }

    fn open_source(self, mut source: Source, base: Option<&Path>) -> SddsResult<Dataset> {
        let layout = read_header(&mut source, base).map_err(|e| match source.path() {
            Some(path) => e.with_context(format!("reading header of {}", path.display())),
            None => e,
        })?;
        Ok(Dataset::reader(
            layout,
            source,
            self.auto_recover,
            self.non_native,
        ))
    }
}

/// Options for creating or extending a dataset.
///
/// Settings left unset come from the template layout when one is given, and otherwise default
/// to row-major binary data in the host byte order.
#[derive(Debug, Clone, Default)]
pub struct SddsWriteOptions {
    template: Option<Layout>,
    mode: Option<DataMode>,
    column_major: Option<bool>,
    description: Option<String>,
    contents: Option<String>,
    byte_order: Option<ByteOrder>,
    fixed_row_count: Option<bool>,
    lines_per_row: Option<usize>,
    no_row_counts: Option<bool>,
    config: EngineConfig,
}

impl SddsWriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a copy of `layout`.
    pub fn with_layout(mut self, layout: &Layout) -> Self {
        self.template = Some(layout.clone());
        self
    }

    pub fn mode(mut self, mode: DataMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn column_major(mut self, column_major: bool) -> Self {
        self.column_major = Some(column_major);
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn contents(mut self, contents: impl Into<String>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    /// Byte order of binary output. An `SDDS_OUTPUT_ENDIANESS` override in the engine
    /// configuration takes precedence.
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    /// Write binary output in the byte order opposite to the host's.
    pub fn non_native(self) -> Self {
        self.byte_order(ByteOrder::native().opposite())
    }

    pub fn fixed_row_count(mut self, fixed: bool) -> Self {
        self.fixed_row_count = Some(fixed);
        self
    }

    pub fn lines_per_row(mut self, lines: usize) -> Self {
        self.lines_per_row = Some(lines.max(1));
        self
    }

    pub fn no_row_counts(mut self, no_row_counts: bool) -> Self {
        self.no_row_counts = Some(no_row_counts);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    fn build_layout(&self) -> (Layout, ByteOrder) {
        let mut layout = self.template.clone().unwrap_or_default();
        layout.version = 0;
        let data = &mut layout.data;
        if let Some(mode) = self.mode {
            data.mode = mode;
        }
        if let Some(column_major) = self.column_major {
            data.column_major = column_major;
        }
        if let Some(fixed) = self.fixed_row_count {
            data.fixed_row_count = fixed;
        }
        if let Some(lines) = self.lines_per_row {
            data.lines_per_row = lines;
        }
        if let Some(no_row_counts) = self.no_row_counts {
            data.no_row_counts = no_row_counts;
        }
        data.additional_header_lines = 0;
        let order = self
            .config
            .output_byte_order
            .or(self.byte_order)
            .unwrap_or_default();
        data.byte_order = Some(order);
        if let Some(text) = &self.description {
            layout.description.text = Some(text.clone());
        }
        if let Some(contents) = &self.contents {
            layout.description.contents = Some(contents.clone());
        }
        (layout, order)
    }

    /// Create or truncate `path`. Definitions may be added until the layout is written.
    pub fn create(self, path: impl AsRef<Path>) -> SddsResult<Dataset> {
        let sink = Sink::create(path)?;
        let (layout, order) = self.build_layout();
        Ok(Dataset::writer(layout, sink, order))
    }

    pub fn create_stdout(self) -> SddsResult<Dataset> {
        let (layout, order) = self.build_layout();
        Ok(Dataset::writer(layout, Sink::stdout(), order))
    }

    pub fn create_in_memory(self) -> SddsResult<Dataset> {
        let (layout, order) = self.build_layout();
        Ok(Dataset::writer(layout, Sink::memory(), order))
    }

    pub fn create_target(self, target: &OutputTarget) -> SddsResult<Dataset> {
        match target {
            OutputTarget::File(path) => self.create(path),
            OutputTarget::Stdout => self.create_stdout(),
            OutputTarget::Memory => self.create_in_memory(),
        }
    }

    /// Open an existing file to add pages after its last one.
    ///
    /// The file's own layout and byte order are used. A template layout, if given, must match
    /// the file's.
    pub fn append(self, path: impl AsRef<Path>) -> SddsResult<Dataset> {
        let path = path.as_ref();
        let (layout, pages, _) = self.scan_existing(path)?;
        let order = layout.data.effective_byte_order();
        debug!("appending to {} after {} pages", path.display(), pages);
        let sink = Sink::append(path)?;
        Ok(Dataset::appender(layout, sink, order, pages, None))
    }

    /// Open an existing file to add rows to its last page.
    ///
    /// The last page is loaded with room for `extra_rows` more rows. It is rewritten in place
    /// by the next page update, write or termination. A file without pages behaves as for
    /// [`append`](Self::append).
    pub fn append_to_page(self, path: impl AsRef<Path>, extra_rows: usize) -> SddsResult<Dataset> {
        let path = path.as_ref();
        let (layout, pages, last) = self.scan_existing(path)?;
        let order = layout.data.effective_byte_order();
        let sink = Sink::append(path)?;
        let last = last.map(|(start, mut page)| {
            page.lengthen(extra_rows);
            (start, page)
        });
        if let Some((start, page)) = &last {
            debug!(
                "appending to page {} of {} ({} rows, starting at byte {})",
                page.number(),
                path.display(),
                page.row_count(),
                start
            );
        }
        Ok(Dataset::appender(layout, sink, order, pages, last))
    }

    /// Read every page of an existing file, returning its layout, page count and last page.
    fn scan_existing(&self, path: &Path) -> SddsResult<(Layout, usize, Option<(u64, crate::Page)>)> {
        let mut reader = SddsOpenOptions::new().open(path)?;
        let layout = reader.layout().clone();
        if let Some(template) = &self.template {
            // Appended pages take the file's encoding, so only the definitions must agree.
            let mut template = template.clone();
            template.data = layout.data.clone();
            template.check_compatible(&layout)?;
        }
        let mut last = None;
        let mut pages = 0;
        loop {
            let start = reader.source_position();
            match reader.read_page()? {
                Some(number) => {
                    pages = number;
                    last = reader.take_page().map(|page| (start, page));
                }
                None => break,
            }
        }
        reader.terminate()?;
        Ok((layout, pages, last))
    }
}
