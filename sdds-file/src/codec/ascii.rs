use std::fmt::Write as _;
use std::io::BufRead;

use itertools::Itertools;
use log::debug;
use sdds_dtype::format::{FormatSpec, render_token};
use sdds_dtype::{SType, TypedBuffer, Value};
use sdds_error::{SddsResult, sdds_bail, sdds_err};

use super::{BlockOrder, PREALLOCATED, RowSelection, array_elements, truncated};
use crate::layout::{ColumnDefinition, Layout};
use crate::page::{ArrayValue, Page};

/// Width of a row count that can be rewritten in place.
pub(crate) const FIXED_COUNT_WIDTH: usize = 20;

/// Reads whitespace-separated tokens across lines, skipping `!` comment lines.
pub(crate) struct Scanner<'a, R> {
    read: &'a mut R,
    raw: Vec<u8>,
    line: String,
    pos: usize,
}

impl<'a, R: BufRead> Scanner<'a, R> {
    pub(crate) fn new(read: &'a mut R) -> Self {
        Self {
            read,
            raw: Vec::new(),
            line: String::new(),
            pos: 0,
        }
    }

    /// Load the next line that is not a comment. Returns false at end of input.
    fn load_line(&mut self) -> SddsResult<bool> {
        loop {
            self.raw.clear();
            if self.read.read_until(b'\n', &mut self.raw)? == 0 {
                self.line.clear();
                self.pos = 0;
                return Ok(false);
            }
            let text = String::from_utf8_lossy(&self.raw);
            let text = text.trim_end_matches(['\n', '\r']);
            if text.trim_start().starts_with('!') {
                continue;
            }
            self.line = text.to_string();
            self.pos = 0;
            return Ok(true);
        }
    }

    fn line_exhausted(&self) -> bool {
        self.line[self.pos..].trim().is_empty()
    }

    /// Advance to the next unread text, skipping blank lines. Returns false at end of input.
    pub(crate) fn seek_content(&mut self) -> SddsResult<bool> {
        while self.line_exhausted() {
            if !self.load_line()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns true if the current line is used up and the next one is blank or missing.
    pub(crate) fn at_page_break(&mut self) -> SddsResult<bool> {
        if !self.line_exhausted() {
            return Ok(false);
        }
        if !self.load_line()? {
            return Ok(true);
        }
        Ok(self.line.trim().is_empty())
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.line[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Take the token at the cursor. Quoted tokens are returned without their quotes but with
    /// escapes intact.
    fn take_token(&mut self) -> String {
        self.skip_whitespace();
        let bytes = self.line.as_bytes();
        if bytes.get(self.pos) == Some(&b'"') {
            let start = self.pos + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end] != b'"' {
                if bytes[end] == b'\\' {
                    end += 1;
                }
                end += 1;
            }
            let end = end.min(bytes.len());
            let token = self.line[start..end].to_string();
            self.pos = (end + 1).min(bytes.len());
            token
        } else {
            let start = self.pos;
            let mut end = start;
            while end < bytes.len() && !bytes[end].is_ascii_whitespace() {
                end += 1;
            }
            self.pos = end;
            self.line[start..end].to_string()
        }
    }

    pub(crate) fn next_token(&mut self) -> SddsResult<Option<String>> {
        if !self.seek_content()? {
            return Ok(None);
        }
        Ok(Some(self.take_token()))
    }

    /// Take `width` characters from the cursor, trimming trailing blanks.
    fn next_fixed(&mut self, width: usize) -> SddsResult<Option<String>> {
        if !self.seek_content()? {
            return Ok(None);
        }
        self.skip_whitespace();
        let rest = &self.line[self.pos..];
        let len = rest
            .char_indices()
            .nth(width)
            .map_or(rest.len(), |(i, _)| i);
        let token = rest[..len].trim_end().to_string();
        self.pos += len;
        Ok(Some(token))
    }

    /// The remainder of the current line as one value, then move past the line.
    fn line_value(&mut self) -> SddsResult<Option<String>> {
        if !self.seek_content()? {
            return Ok(None);
        }
        self.skip_whitespace();
        let value = if self.line[self.pos..].starts_with('"') {
            self.take_token()
        } else {
            self.line[self.pos..].trim_end().to_string()
        };
        self.finish_line();
        Ok(Some(value))
    }

    pub(crate) fn finish_line(&mut self) {
        self.pos = self.line.len();
    }

    /// Read one cell of `field`.
    pub(crate) fn next_field(&mut self, field: &AsciiField) -> SddsResult<Option<Value>> {
        let token = if field.stype == SType::String && field.field_length != 0 {
            self.next_fixed(field.field_length.unsigned_abs() as usize)?
        } else {
            self.next_token()?
        };
        token.map(|t| parse_cell(field.stype, &t)).transpose()
    }
}

fn parse_cell(stype: SType, token: &str) -> SddsResult<Value> {
    Value::parse(stype, token)
        .map_err(|e| sdds_err!(CorruptPage: "invalid {} data {:?}: {}", stype, token, e))
}

/// How one column is rendered and scanned.
pub(crate) struct AsciiField {
    pub(crate) stype: SType,
    pub(crate) field_length: i32,
    pub(crate) format: Option<FormatSpec>,
}

impl AsciiField {
    pub(crate) fn new(def: &ColumnDefinition) -> Self {
        Self {
            stype: def.stype,
            field_length: def.field_length,
            format: def.format_string.as_deref().and_then(FormatSpec::parse),
        }
    }

    pub(crate) fn of_layout(layout: &Layout) -> Vec<Self> {
        layout.columns.iter().map(Self::new).collect()
    }

    pub(crate) fn render(&self, column: &TypedBuffer, row: usize, out: &mut String) {
        let Some(value) = column.get(row) else {
            return;
        };
        match (&value, self.field_length) {
            (Value::String(s), width) if width != 0 => {
                let width = width.unsigned_abs() as usize;
                let clipped: String = s.chars().take(width).collect();
                let _ = write!(out, "{clipped:<width$}");
            }
            _ => out.push_str(&render_token(&value, self.format.as_ref())),
        }
    }
}

fn row_count_line(count: usize, fixed: bool) -> String {
    if fixed {
        format!("{count:>width$}\n", width = FIXED_COUNT_WIDTH)
    } else {
        format!("{count}\n")
    }
}

/// Decode the next ASCII page, or `None` at end of input.
pub(crate) fn read_page<O: BlockOrder, R: BufRead>(
    read: &mut R,
    layout: &Layout,
    number: usize,
    selection: RowSelection,
    recover: bool,
) -> SddsResult<Option<(Page, bool)>> {
    let mut scanner = Scanner::new(read);
    if !scanner.seek_content()? {
        return Ok(None);
    }

    let mut parameters = Vec::with_capacity(layout.parameters.len());
    for def in &layout.parameters {
        if let Some(fixed) = def.parsed_fixed_value()? {
            parameters.push(fixed);
            continue;
        }
        let text = match def.stype {
            SType::String => scanner.line_value()?,
            _ => {
                let token = scanner.next_token()?;
                scanner.finish_line();
                token
            }
        };
        let Some(text) = text else {
            sdds_bail!(CorruptPage: "page {} ends before parameter {}", number, def.name);
        };
        parameters.push(parse_cell(def.stype, &text)?);
    }

    let mut arrays = Vec::with_capacity(layout.arrays.len());
    for def in &layout.arrays {
        let mut dimensions = Vec::with_capacity(def.dimensions);
        for _ in 0..def.dimensions {
            let token = scanner
                .next_token()?
                .ok_or_else(|| sdds_err!(CorruptPage: "page {} ends before array {}", number, def.name))?;
            dimensions.push(token.parse::<usize>().map_err(|_| {
                sdds_err!(CorruptPage: "invalid extent {:?} for array {}", token, def.name)
            })?);
        }
        scanner.finish_line();
        let field = AsciiField {
            stype: def.stype,
            field_length: def.field_length,
            format: None,
        };
        let elements = array_elements(&dimensions, &def.name, number)?;
        let mut data = TypedBuffer::with_capacity(def.stype, elements.min(PREALLOCATED));
        for _ in 0..elements {
            let value = scanner
                .next_field(&field)?
                .ok_or_else(|| sdds_err!(CorruptPage: "page {} ends inside array {}", number, def.name))?;
            data.push(&value)?;
        }
        scanner.finish_line();
        arrays.push(ArrayValue::new(dimensions, data)?);
    }

    let data = &layout.data;
    let rows = if data.no_row_counts && !data.column_major {
        None
    } else {
        let token = scanner
            .next_token()?
            .ok_or_else(|| sdds_err!(CorruptPage: "page {} has no row count", number))?;
        scanner.finish_line();
        let count: i64 = token
            .parse()
            .map_err(|_| sdds_err!(CorruptPage: "invalid row count {:?} on page {}", token, number))?;
        Some(usize::try_from(count.max(0)).map_err(|_| sdds_err!(CorruptPage: "row count {} is too large", count))?)
    };
    debug!("ASCII page {} with {:?} rows", number, rows);

    let fields = AsciiField::of_layout(layout);
    let (columns, cut_short) = O::read_ascii(&mut scanner, &fields, rows, selection, recover)
        .map_err(|e| truncated(e, number))?;
    scanner.finish_line();
    let kept = selection.kept(rows.unwrap_or(0));
    Ok(Some((
        Page::from_parts(number, parameters, arrays, columns, kept)?,
        cut_short,
    )))
}

/// The text that precedes the rows of a page, and the byte offset of its row count when the
/// page has one.
pub(crate) fn page_prefix(
    layout: &Layout,
    page: &Page,
    count: usize,
    fixed_count: bool,
) -> SddsResult<(String, Option<usize>)> {
    let mut out = String::new();
    let _ = writeln!(out, "! page number {}", page.number());
    for (def, value) in layout.parameters.iter().zip(page.parameters()) {
        if def.fixed_value.is_some() {
            continue;
        }
        let format = def.format_string.as_deref().and_then(FormatSpec::parse);
        out.push_str(&render_token(value, format.as_ref()));
        out.push('\n');
    }
    for (def, array) in layout.arrays.iter().zip(page.arrays()) {
        out.push_str(&array.dimensions.iter().join(" "));
        out.push('\n');
        if array.element_count() > 0 {
            let format = def.format_string.as_deref().and_then(FormatSpec::parse);
            out.push_str(
                &array
                    .data
                    .iter()
                    .map(|v| render_token(&v, format.as_ref()))
                    .join(" "),
            );
            out.push('\n');
        }
    }
    let data = &layout.data;
    let offset = if data.no_row_counts && !data.column_major {
        None
    } else {
        let offset = out.len();
        out.push_str(&row_count_line(count, fixed_count));
        Some(offset)
    };
    Ok((out, offset))
}

/// Render a row count for rewriting at the offset returned by [`page_prefix`].
pub(crate) fn fixed_count_text(count: usize) -> String {
    format!("{count:>width$}", width = FIXED_COUNT_WIDTH)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn scanner_tokens_and_comments() {
        let mut read = Cursor::new(b"! comment\n  1 \"two words\" three\n\n\"a\\\"b\"\n".to_vec());
        let mut scanner = Scanner::new(&mut read);
        assert_eq!(scanner.next_token().unwrap().as_deref(), Some("1"));
        assert_eq!(scanner.next_token().unwrap().as_deref(), Some("two words"));
        assert_eq!(scanner.next_token().unwrap().as_deref(), Some("three"));
        assert_eq!(scanner.next_token().unwrap().as_deref(), Some("a\\\"b"));
        assert_eq!(scanner.next_token().unwrap(), None);
    }

    #[test]
    fn page_break_on_blank_line() {
        let mut read = Cursor::new(b"1 2\n\n3 4\n".to_vec());
        let mut scanner = Scanner::new(&mut read);
        assert!(!scanner.at_page_break().unwrap());
        scanner.next_token().unwrap();
        scanner.next_token().unwrap();
        assert!(scanner.at_page_break().unwrap());
        assert_eq!(scanner.next_token().unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn fixed_width_strings() {
        let field = AsciiField {
            stype: SType::String,
            field_length: 5,
            format: None,
        };
        let column = TypedBuffer::from(vec!["ab", "abcdefg"]);
        let mut out = String::new();
        field.render(&column, 0, &mut out);
        field.render(&column, 1, &mut out);
        assert_eq!(out, "ab   abcde");

        let mut read = Cursor::new(out.into_bytes());
        let mut scanner = Scanner::new(&mut read);
        assert_eq!(
            scanner.next_field(&field).unwrap(),
            Some(Value::from("ab"))
        );
        assert_eq!(
            scanner.next_field(&field).unwrap(),
            Some(Value::from("abcde"))
        );
    }

    #[test]
    fn fixed_counts_have_constant_width() {
        assert_eq!(fixed_count_text(7).len(), FIXED_COUNT_WIDTH);
        assert_eq!(row_count_line(12, false), "12\n");
        assert_eq!(row_count_line(12, true).trim(), "12");
    }
}
