//! Reading and writing the text header.
//!
//! A header is a version line followed by namelist directives of the form
//! `&kind attr=value, attr="quoted value", &end`, ending with the `&data` directive. Lines
//! starting with `!` are comments, except that `!#` comments carry byte order and row count
//! flags.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use sdds_dtype::SType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_io::ByteOrder;

use crate::layout::{
    ArrayDefinition, AssociateDefinition, ColumnDefinition, DataMode, Layout, MAX_VERSION,
    ParameterDefinition,
};

const MAX_INCLUDE_DEPTH: usize = 8;

/// A directive split into its kind and raw attribute list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Directive {
    kind: String,
    attrs: Vec<(String, String)>,
    text: String,
}

impl Directive {
    fn take(&mut self, name: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(idx).1)
    }

    fn take_usize(&mut self, name: &str) -> SddsResult<Option<usize>> {
        self.take(name)
            .map(|v| {
                v.trim().parse::<usize>().map_err(|_| {
                    sdds_err!(CorruptHeader: "&{} attribute {} has invalid value {:?}", self.kind, name, v)
                })
            })
            .transpose()
    }

    fn take_i32(&mut self, name: &str) -> SddsResult<Option<i32>> {
        self.take(name)
            .map(|v| {
                v.trim().parse::<i32>().map_err(|_| {
                    sdds_err!(CorruptHeader: "&{} attribute {} has invalid value {:?}", self.kind, name, v)
                })
            })
            .transpose()
    }

    fn take_flag(&mut self, name: &str) -> SddsResult<Option<bool>> {
        Ok(self.take_i32(name)?.map(|v| v != 0))
    }

    fn take_name(&mut self) -> SddsResult<String> {
        match self.take("name") {
            Some(name) if !name.is_empty() => Ok(name),
            _ => sdds_bail!(CorruptHeader: "&{} directive without a name", self.kind),
        }
    }

    fn take_type(&mut self, name: &str) -> SddsResult<SType> {
        let Some(text) = self.take("type") else {
            sdds_bail!(CorruptHeader: "&{} {} has no type", self.kind, name);
        };
        SType::from_name(&text)
            .ok_or_else(|| sdds_err!(CorruptHeader: "&{} {} has unknown type {:?}", self.kind, name, text))
    }

    /// Warn about attributes nobody consumed.
    fn finish(self) {
        for (attr, _) in self.attrs {
            warn!("ignoring unknown attribute {} of &{}", attr, self.kind);
        }
    }
}

/// Position of the `&end` that closes the directive starting at `text[0]`, outside quotes.
fn directive_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quoted = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quoted => i += 1,
            b'"' => quoted = !quoted,
            b'&' if !quoted && i > 0 && bytes.len() - i >= 4 => {
                if bytes[i..i + 4].eq_ignore_ascii_case(b"&end") {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn unquote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n @ ('"' | '\\')) => out.push(n),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse the body of one complete directive, `&kind ... ` without the closing `&end`.
fn parse_directive(text: &str) -> SddsResult<Directive> {
    let body = text.trim_start();
    let Some(rest) = body.strip_prefix('&') else {
        sdds_bail!(CorruptHeader: "expected a directive, found {:?}", text.trim());
    };
    let kind_len = rest
        .find(|c: char| c.is_whitespace() || c == ',')
        .unwrap_or(rest.len());
    let kind = rest[..kind_len].to_ascii_lowercase();
    let mut attrs = Vec::new();
    let bytes = rest.as_bytes();
    let mut i = kind_len;
    loop {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b',') {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let Some(eq) = rest[i..].find('=') else {
            sdds_bail!(CorruptHeader: "attribute without a value in &{}: {:?}", kind, &rest[i..]);
        };
        let name = rest[i..i + eq].trim().to_ascii_lowercase();
        i += eq + 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let value = if bytes.get(i) == Some(&b'"') {
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() && bytes[j] != b'"' {
                if bytes[j] == b'\\' {
                    j += 1;
                }
                j += 1;
            }
            if j >= bytes.len() {
                sdds_bail!(CorruptHeader: "unterminated quote in &{}", kind);
            }
            i = j + 1;
            unquote(&rest[start..j])
        } else {
            let start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b',' {
                i += 1;
            }
            rest[start..i].to_string()
        };
        attrs.push((name, value));
    }
    Ok(Directive {
        kind,
        attrs,
        text: body.trim_end().to_string(),
    })
}

/// Where a directive kind may appear relative to the others.
fn rank(kind: &str) -> Option<u8> {
    Some(match kind {
        "description" => 0,
        "parameter" => 1,
        "array" => 2,
        "column" => 3,
        "associate" => 4,
        "data" => 5,
        _ => return None,
    })
}

fn parse_version(line: &str) -> SddsResult<u32> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('!').unwrap_or(trimmed);
    let Some(number) = trimmed.strip_prefix("SDDS") else {
        sdds_bail!(CorruptHeader: "not an SDDS header: {:?}", line.trim());
    };
    let version: u32 = number
        .trim()
        .parse()
        .map_err(|_| sdds_err!(CorruptHeader: "invalid SDDS version {:?}", number.trim()))?;
    if version == 0 || version > MAX_VERSION {
        sdds_bail!(CorruptHeader: "unsupported SDDS version {}", version);
    }
    Ok(version)
}

/// Incremental header parser. Lines are fed in until the `&data` directive completes.
struct HeaderParser {
    layout: Layout,
    pending: String,
    last_rank: u8,
    done: bool,
    base: Option<PathBuf>,
    depth: usize,
    comment_byte_order: Option<ByteOrder>,
}

impl HeaderParser {
    fn new(version: u32, base: Option<PathBuf>) -> Self {
        Self {
            layout: Layout {
                version,
                ..Layout::default()
            },
            pending: String::new(),
            last_rank: 0,
            done: false,
            base,
            depth: 0,
            comment_byte_order: None,
        }
    }

    fn feed_line(&mut self, line: &str) -> SddsResult<()> {
        let trimmed = line.trim();
        if self.pending.is_empty() {
            if trimmed.is_empty() {
                return Ok(());
            }
            if let Some(comment) = trimmed.strip_prefix('!') {
                self.comment(comment);
                return Ok(());
            }
            if !trimmed.starts_with('&') {
                sdds_bail!(CorruptHeader: "unexpected header text {:?}", trimmed);
            }
        }
        self.pending.push_str(line);
        self.pending.push('\n');
        while let Some(end) = directive_end(&self.pending) {
            let text: String = self.pending[..end].to_string();
            let tail = self.pending[end + 4..].trim_start().to_string();
            self.pending = tail;
            self.directive(parse_directive(&text)?)?;
            if self.done {
                return Ok(());
            }
            if !self.pending.is_empty() && !self.pending.trim_start().starts_with('&') {
                sdds_bail!(CorruptHeader: "unexpected header text {:?}", self.pending.trim());
            }
            if self.pending.trim().is_empty() {
                self.pending.clear();
            }
        }
        Ok(())
    }

    fn comment(&mut self, comment: &str) {
        let Some(flag) = comment.strip_prefix('#') else {
            return;
        };
        match flag.trim().to_ascii_lowercase().as_str() {
            "little-endian" => self.comment_byte_order = Some(ByteOrder::Little),
            "big-endian" => self.comment_byte_order = Some(ByteOrder::Big),
            "fixed-rowcount" => self.layout.data.fixed_row_count = true,
            other => warn!("ignoring unrecognized header flag !#{}", other),
        }
    }

    fn directive(&mut self, mut directive: Directive) -> SddsResult<()> {
        if directive.kind == "include" {
            return self.include(directive);
        }
        let Some(rank) = rank(&directive.kind) else {
            warn!("keeping unknown header directive &{}", directive.kind);
            self.layout.unknown_directives.push(format!("{} &end", directive.text));
            return Ok(());
        };
        if rank < self.last_rank || (rank == 0 && self.last_rank == 0 && self.seen_description()) {
            sdds_bail!(CorruptHeader: "&{} directive is out of order", directive.kind);
        }
        self.last_rank = rank;
        match directive.kind.as_str() {
            "description" => {
                self.layout.description.text = directive.take("text");
                self.layout.description.contents = directive.take("contents");
            }
            "parameter" => {
                let name = directive.take_name()?;
                let stype = directive.take_type(&name)?;
                let def = ParameterDefinition {
                    symbol: directive.take("symbol"),
                    units: directive.take("units"),
                    description: directive.take("description"),
                    format_string: directive.take("format_string"),
                    fixed_value: directive.take("fixed_value"),
                    ..ParameterDefinition::new(name, stype)
                };
                self.layout.define_parameter(def)?;
            }
            "array" => {
                let name = directive.take_name()?;
                let stype = directive.take_type(&name)?;
                let dimensions = directive.take_usize("dimensions")?.unwrap_or(1);
                let def = ArrayDefinition {
                    symbol: directive.take("symbol"),
                    units: directive.take("units"),
                    description: directive.take("description"),
                    format_string: directive.take("format_string"),
                    group_name: directive.take("group_name"),
                    field_length: directive.take_i32("field_length")?.unwrap_or(0),
                    ..ArrayDefinition::new(name, stype, dimensions)
                };
                self.layout.define_array(def)?;
            }
            "column" => {
                let name = directive.take_name()?;
                let stype = directive.take_type(&name)?;
                let def = ColumnDefinition {
                    symbol: directive.take("symbol"),
                    units: directive.take("units"),
                    description: directive.take("description"),
                    format_string: directive.take("format_string"),
                    field_length: directive.take_i32("field_length")?.unwrap_or(0),
                    ..ColumnDefinition::new(name, stype)
                };
                self.layout.define_column(def)?;
            }
            "associate" => {
                let def = AssociateDefinition {
                    name: directive.take_name()?,
                    filename: directive.take("filename"),
                    path: directive.take("path"),
                    description: directive.take("description"),
                    contents: directive.take("contents"),
                    sdds: directive.take_flag("sdds")?.unwrap_or(false),
                };
                self.layout.define_associate(def)?;
            }
            "data" => {
                let data = &mut self.layout.data;
                if let Some(mode) = directive.take("mode") {
                    data.mode = DataMode::from_name(&mode)
                        .ok_or_else(|| sdds_err!(CorruptHeader: "unknown data mode {:?}", mode))?;
                }
                data.lines_per_row = directive.take_usize("lines_per_row")?.unwrap_or(1).max(1);
                data.no_row_counts = directive.take_flag("no_row_counts")?.unwrap_or(false);
                data.additional_header_lines =
                    directive.take_usize("additional_header_lines")?.unwrap_or(0);
                data.column_major = directive.take_flag("column_major_order")?.unwrap_or(false);
                if let Some(endian) = directive.take("endian") {
                    data.byte_order = Some(
                        ByteOrder::parse(&endian)
                            .ok_or_else(|| sdds_err!(CorruptHeader: "unknown endian {:?}", endian))?,
                    );
                }
                if data.byte_order.is_none() {
                    data.byte_order = self.comment_byte_order;
                }
                self.done = true;
            }
            _ => unreachable!("ranked directive kinds are handled above"),
        }
        directive.finish();
        Ok(())
    }

    fn seen_description(&self) -> bool {
        self.layout.description.text.is_some() || self.layout.description.contents.is_some()
    }

    fn include(&mut self, mut directive: Directive) -> SddsResult<()> {
        let Some(filename) = directive.take("filename") else {
            sdds_bail!(CorruptHeader: "&include without a filename");
        };
        directive.finish();
        if self.depth >= MAX_INCLUDE_DEPTH {
            sdds_bail!(CorruptHeader: "&include nested too deeply at {}", filename);
        }
        let path = match &self.base {
            Some(base) if Path::new(&filename).is_relative() => base.join(&filename),
            _ => PathBuf::from(&filename),
        };
        debug!("including header directives from {}", path.display());
        let reader = BufReader::new(
            File::open(&path).map_err(|e| sdds_err!(CorruptHeader: "cannot include {}: {}", path.display(), e))?,
        );
        let saved_base = self.base.replace(path.parent().map(Path::to_path_buf).unwrap_or_default());
        self.depth += 1;
        for line in reader.lines() {
            let line = line?;
            if line.trim_start().starts_with("SDDS") || line.trim_start().starts_with("!SDDS") {
                continue;
            }
            self.feed_line(&line)?;
            if self.done {
                break;
            }
        }
        self.depth -= 1;
        self.base = saved_base;
        Ok(())
    }
}

/// Read a header from `read`, leaving it positioned at the first byte of data.
///
/// `base` is the directory that relative `&include` paths resolve against.
pub fn read_header<R: BufRead>(read: &mut R, base: Option<&Path>) -> SddsResult<Layout> {
    let mut line = Vec::new();
    if read.read_until(b'\n', &mut line)? == 0 {
        sdds_bail!(CorruptHeader: "empty input");
    }
    let version = parse_version(&String::from_utf8_lossy(&line))?;
    let mut parser = HeaderParser::new(version, base.map(Path::to_path_buf));
    while !parser.done {
        line.clear();
        if read.read_until(b'\n', &mut line)? == 0 {
            sdds_bail!(CorruptHeader: "header ends before the &data directive");
        }
        parser.feed_line(&String::from_utf8_lossy(&line))?;
    }
    if !parser.pending.trim().is_empty() {
        warn!("ignoring header text after &data: {:?}", parser.pending.trim());
    }
    let layout = parser.layout;
    if layout.data.mode == DataMode::Ascii {
        for _ in 0..layout.data.additional_header_lines {
            line.clear();
            read.read_until(b'\n', &mut line)?;
        }
    }
    debug!(
        "read SDDS{} header: {} parameters, {} arrays, {} columns, {} data",
        layout.version,
        layout.parameters.len(),
        layout.arrays.len(),
        layout.columns.len(),
        layout.data.mode
    );
    Ok(layout)
}

/// Render an attribute value, quoting it when it would not scan as one bare token.
fn attr_value(value: &str) -> String {
    let plain = !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '"' | '&' | '\\' | '=' | '!'));
    if plain {
        value.to_string()
    } else {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    }
}

struct DirectiveWriter {
    text: String,
}

impl DirectiveWriter {
    fn new(kind: &str) -> Self {
        Self {
            text: format!("&{kind}"),
        }
    }

    fn attr(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.text.push(' ');
        self.text.push_str(name);
        self.text.push('=');
        self.text.push_str(&attr_value(value.as_ref()));
        self.text.push(',');
        self
    }

    fn opt(self, name: &str, value: Option<&String>) -> Self {
        match value {
            Some(v) => self.attr(name, v),
            None => self,
        }
    }

    fn finish<W: Write>(mut self, write: &mut W) -> SddsResult<()> {
        self.text.push_str(" &end\n");
        write.write_all(self.text.as_bytes())?;
        Ok(())
    }
}

/// Write `layout` as a header, declaring `byte_order` for binary data.
pub fn write_header<W: Write>(layout: &Layout, byte_order: ByteOrder, write: &mut W) -> SddsResult<()> {
    let data = &layout.data;
    writeln!(write, "SDDS{}", layout.required_version())?;
    if data.mode == DataMode::Binary {
        writeln!(write, "!# {}", byte_order.header_name())?;
    }
    if data.fixed_row_count {
        writeln!(write, "!# fixed-rowcount")?;
    }
    let description = &layout.description;
    if description.text.is_some() || description.contents.is_some() {
        DirectiveWriter::new("description")
            .opt("text", description.text.as_ref())
            .opt("contents", description.contents.as_ref())
            .finish(write)?;
    }
    for p in &layout.parameters {
        DirectiveWriter::new("parameter")
            .attr("name", &p.name)
            .opt("symbol", p.symbol.as_ref())
            .opt("units", p.units.as_ref())
            .opt("description", p.description.as_ref())
            .opt("format_string", p.format_string.as_ref())
            .attr("type", p.stype.name())
            .opt("fixed_value", p.fixed_value.as_ref())
            .finish(write)?;
    }
    for a in &layout.arrays {
        let mut d = DirectiveWriter::new("array")
            .attr("name", &a.name)
            .opt("symbol", a.symbol.as_ref())
            .opt("units", a.units.as_ref())
            .opt("description", a.description.as_ref())
            .opt("format_string", a.format_string.as_ref())
            .opt("group_name", a.group_name.as_ref())
            .attr("type", a.stype.name());
        if a.field_length != 0 {
            d = d.attr("field_length", a.field_length.to_string());
        }
        d.attr("dimensions", a.dimensions.to_string()).finish(write)?;
    }
    for c in &layout.columns {
        let mut d = DirectiveWriter::new("column")
            .attr("name", &c.name)
            .opt("symbol", c.symbol.as_ref())
            .opt("units", c.units.as_ref())
            .opt("description", c.description.as_ref())
            .opt("format_string", c.format_string.as_ref())
            .attr("type", c.stype.name());
        if c.field_length != 0 {
            d = d.attr("field_length", c.field_length.to_string());
        }
        d.finish(write)?;
    }
    for a in &layout.associates {
        DirectiveWriter::new("associate")
            .attr("name", &a.name)
            .opt("filename", a.filename.as_ref())
            .opt("path", a.path.as_ref())
            .opt("description", a.description.as_ref())
            .opt("contents", a.contents.as_ref())
            .attr("sdds", if a.sdds { "1" } else { "0" })
            .finish(write)?;
    }
    for unknown in &layout.unknown_directives {
        writeln!(write, "{unknown}")?;
    }
    let mut d = DirectiveWriter::new("data").attr("mode", data.mode.name());
    match data.mode {
        DataMode::Binary => {
            d = d.attr(
                "endian",
                match byte_order {
                    ByteOrder::Little => "little",
                    ByteOrder::Big => "big",
                },
            );
        }
        DataMode::Ascii => {
            if data.lines_per_row != 1 {
                d = d.attr("lines_per_row", data.lines_per_row.to_string());
            }
            if data.no_row_counts {
                d = d.attr("no_row_counts", "1");
            }
        }
    }
    if data.column_major {
        d = d.attr("column_major_order", "1");
    }
    d.finish(write)
}
