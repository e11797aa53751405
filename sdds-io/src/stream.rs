use std::fs::{File, OpenOptions};
use std::io::{
    self, BufRead, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, StdinLock, Stdout, Write,
};
use std::path::{Path, PathBuf};

use log::debug;
use sdds_error::{SddsResult, sdds_bail};

enum SourceKind {
    File(BufReader<File>),
    Stdin(StdinLock<'static>),
    Memory(Cursor<Vec<u8>>),
}

/// A buffered input stream that tracks how many bytes have been consumed.
pub struct Source {
    kind: SourceKind,
    path: Option<PathBuf>,
    position: u64,
}

impl Source {
    pub fn open(path: impl AsRef<Path>) -> SddsResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("opened {} for reading", path.display());
        Ok(Self {
            kind: SourceKind::File(BufReader::new(file)),
            path: Some(path.to_path_buf()),
            position: 0,
        })
    }

    pub fn stdin() -> Self {
        Self {
            kind: SourceKind::Stdin(io::stdin().lock()),
            path: None,
            position: 0,
        }
    }

    pub fn memory(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: SourceKind::Memory(Cursor::new(bytes.into())),
            path: None,
            position: 0,
        }
    }

    /// The file this source reads, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Bytes consumed from the start of the stream.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns true once no bytes remain.
    pub fn at_eof(&mut self) -> SddsResult<bool> {
        Ok(self.fill_buf()?.is_empty())
    }

    fn inner(&mut self) -> &mut dyn BufRead {
        match &mut self.kind {
            SourceKind::File(r) => r,
            SourceKind::Stdin(r) => r,
            SourceKind::Memory(r) => r,
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner().read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl BufRead for Source {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner().fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner().consume(amt);
        self.position += amt as u64;
    }
}

enum SinkKind {
    File(BufWriter<File>),
    Stdout(BufWriter<Stdout>),
    Memory(Cursor<Vec<u8>>),
}

/// A buffered output stream. File and memory sinks can seek back to rewrite earlier bytes.
pub struct Sink {
    kind: SinkKind,
    path: Option<PathBuf>,
    position: u64,
}

impl Sink {
    /// Create or truncate `path`.
    pub fn create(path: impl AsRef<Path>) -> SddsResult<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        debug!("created {}", path.display());
        Ok(Self {
            kind: SinkKind::File(BufWriter::new(file)),
            path: Some(path.to_path_buf()),
            position: 0,
        })
    }

    /// Open an existing file for writing, positioned at `offset`.
    pub fn open_at(path: impl AsRef<Path>, offset: u64) -> SddsResult<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let position = file.seek(SeekFrom::Start(offset))?;
        debug!("opened {} for update at byte {}", path.display(), position);
        Ok(Self {
            kind: SinkKind::File(BufWriter::new(file)),
            path: Some(path.to_path_buf()),
            position,
        })
    }

    /// Open an existing file for writing at its end.
    pub fn append(path: impl AsRef<Path>) -> SddsResult<Self> {
        let len = std::fs::metadata(path.as_ref())?.len();
        Self::open_at(path, len)
    }

    pub fn stdout() -> Self {
        Self {
            kind: SinkKind::Stdout(BufWriter::new(io::stdout())),
            path: None,
            position: 0,
        }
    }

    pub fn memory() -> Self {
        Self::memory_from(Vec::new())
    }

    /// A memory sink holding `bytes`, positioned at the end.
    pub fn memory_from(bytes: Vec<u8>) -> Self {
        let position = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(position);
        Self {
            kind: SinkKind::Memory(cursor),
            path: None,
            position,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current write offset from the start of the stream.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_seekable(&self) -> bool {
        !matches!(self.kind, SinkKind::Stdout(_))
    }

    /// Move the write offset to `offset`.
    pub fn seek_to(&mut self, offset: u64) -> SddsResult<()> {
        self.position = match &mut self.kind {
            SinkKind::File(w) => w.seek(SeekFrom::Start(offset))?,
            SinkKind::Memory(c) => {
                c.set_position(offset);
                offset
            }
            SinkKind::Stdout(_) => sdds_bail!(State: "cannot reposition standard output"),
        };
        Ok(())
    }

    /// Discard everything from `len` onwards and continue writing there.
    pub fn truncate(&mut self, len: u64) -> SddsResult<()> {
        match &mut self.kind {
            SinkKind::File(w) => {
                w.flush()?;
                w.get_ref().set_len(len)?;
                w.seek(SeekFrom::Start(len))?;
            }
            SinkKind::Memory(c) => {
                let keep = usize::try_from(len).map_err(|_| io::Error::other("length overflow"))?;
                c.get_mut().truncate(keep);
                c.set_position(len);
            }
            SinkKind::Stdout(_) => sdds_bail!(State: "cannot truncate standard output"),
        }
        self.position = len;
        Ok(())
    }

    /// The bytes written to a memory sink.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            SinkKind::Memory(c) => Some(c.get_ref()),
            _ => None,
        }
    }

    /// Flush and return the bytes of a memory sink.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self.kind {
            SinkKind::Memory(c) => Some(c.into_inner()),
            _ => None,
        }
    }

    fn inner(&mut self) -> &mut dyn Write {
        match &mut self.kind {
            SinkKind::File(w) => w,
            SinkKind::Stdout(w) => w,
            SinkKind::Memory(w) => w,
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner().write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }
}

#[cfg(test)]
mod test {
    use sdds_error::ErrorKind;

    use super::*;

    #[test]
    fn source_tracks_position() {
        let mut source = Source::memory(b"line one\nrest".to_vec());
        let mut line = String::new();
        source.read_line(&mut line).unwrap();
        assert_eq!(line, "line one\n");
        assert_eq!(source.position(), 9);
        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"rest");
        assert!(source.at_eof().unwrap());
    }

    #[test]
    fn memory_sink_rewrites() {
        let mut sink = Sink::memory();
        sink.write_all(b"count=0000 rows").unwrap();
        sink.seek_to(6).unwrap();
        sink.write_all(b"0042").unwrap();
        assert_eq!(sink.position(), 10);
        sink.seek_to(15).unwrap();
        sink.write_all(b"!").unwrap();
        sink.truncate(10).unwrap();
        assert_eq!(sink.into_bytes().unwrap(), b"count=0042");
    }

    #[test]
    fn file_sink_append_and_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        {
            let mut sink = Sink::create(&path).unwrap();
            sink.write_all(b"abcdef").unwrap();
            sink.flush().unwrap();
        }
        {
            let mut sink = Sink::append(&path).unwrap();
            assert_eq!(sink.position(), 6);
            sink.truncate(3).unwrap();
            sink.write_all(b"XY").unwrap();
            sink.flush().unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"abcXY");
    }

    #[test]
    fn stdout_cannot_seek() {
        let mut sink = Sink::stdout();
        assert!(!sink.is_seekable());
        assert_eq!(sink.seek_to(0).unwrap_err().kind(), ErrorKind::State);
    }
}
