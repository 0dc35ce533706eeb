//! File handle that enforces the capabilities of its open mode.

use super::mode::Capabilities;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};

#[derive(Debug)]
enum Stream {
    Plain(File),
    Reader(BufReader<File>),
    // Writes are buffered; reads flush first and go straight to the file.
    Writer(BufWriter<File>),
}

impl Stream {
    fn new(file: File, caps: Capabilities, buffer_capacity: Option<usize>) -> Self {
        match buffer_capacity {
            None | Some(0) => Stream::Plain(file),
            Some(capacity) if caps.write => {
                Stream::Writer(BufWriter::with_capacity(capacity, file))
            }
            Some(capacity) => Stream::Reader(BufReader::with_capacity(capacity, file)),
        }
    }

    /// Flushes pending writes and releases the file.
    fn release(self) -> io::Result<()> {
        match self {
            Stream::Writer(writer) => writer.into_inner().map(drop).map_err(|e| e.into_error()),
            Stream::Plain(_) | Stream::Reader(_) => Ok(()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Handle {
    stream: Option<Stream>,
    caps: Capabilities,
}

impl Handle {
    pub(crate) fn new(file: File, caps: Capabilities, buffer_capacity: Option<usize>) -> Self {
        Self {
            stream: Some(Stream::new(file, caps, buffer_capacity)),
            caps,
        }
    }

    pub(crate) fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Flushes and releases the underlying file. Safe to call more than once.
    ///
    /// The handle counts as closed even when the final flush fails.
    pub(crate) fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(stream) => stream.release(),
            None => Ok(()),
        }
    }

    fn open_stream(&mut self) -> io::Result<&mut Stream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::other("I/O operation on closed file"))
    }
}

impl Read for Handle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let readable = self.caps.read;
        let stream = self.open_stream()?;
        if !readable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file not opened for reading",
            ));
        }
        match stream {
            Stream::Plain(file) => file.read(buf),
            Stream::Reader(reader) => reader.read(buf),
            Stream::Writer(writer) => {
                writer.flush()?;
                writer.get_mut().read(buf)
            }
        }
    }
}

impl Write for Handle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writable = self.caps.write;
        let stream = self.open_stream()?;
        if !writable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file not opened for writing",
            ));
        }
        match stream {
            Stream::Plain(file) => file.write(buf),
            Stream::Reader(reader) => reader.get_mut().write(buf),
            Stream::Writer(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(Stream::Plain(file)) => file.flush(),
            Some(Stream::Writer(writer)) => writer.flush(),
            Some(Stream::Reader(_)) | None => Ok(()),
        }
    }
}

impl Seek for Handle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.open_stream()? {
            Stream::Plain(file) => file.seek(pos),
            Stream::Reader(reader) => reader.seek(pos),
            Stream::Writer(writer) => writer.seek(pos),
        }
    }
}
