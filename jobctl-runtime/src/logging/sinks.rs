//! Output sinks for console and log files
//!
//! A `TeeWriter` duplicates every write to a console writer and a file
//! writer. `FileSinks` is the tracing writer that starts discarding and
//! switches to the job log files once job logging is set up.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

/// Append-only file shared between writers
///
/// Each `write` holds the lock for the whole buffer, so concurrent writers
/// never interleave inside a line.
#[derive(Debug, Clone)]
pub struct SharedFile {
    file: Arc<Mutex<File>>,
}

impl SharedFile {
    /// Opens `path` for appending, creating it if needed
    pub fn append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

/// Writer that sends every byte to both a console and a file
#[derive(Debug)]
pub struct TeeWriter<C, F> {
    console: C,
    file: F,
}

impl<C: Write, F: Write> TeeWriter<C, F> {
    /// Composes a console writer and a file writer
    pub fn new(console: C, file: F) -> Self {
        Self { console, file }
    }

    /// Splits the tee back into its writers
    pub fn into_inner(self) -> (C, F) {
        (self.console, self.file)
    }
}

impl<C: Write, F: Write> Write for TeeWriter<C, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.console.write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()?;
        self.file.flush()
    }
}

#[derive(Debug, Clone)]
struct Attached {
    out: SharedFile,
    err: SharedFile,
}

/// Tracing writer targeting the job log files
///
/// Until files are attached every record is discarded. Afterwards ERROR
/// records go to the error file and everything else to the output file,
/// mirroring the console's stdout/stderr split.
#[derive(Debug, Clone, Default)]
pub struct FileSinks {
    attached: Arc<RwLock<Option<Attached>>>,
}

impl FileSinks {
    /// Creates sinks with no files attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes subsequent records to these files
    pub fn attach(&self, out: SharedFile, err: SharedFile) {
        let mut attached = self
            .attached
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *attached = Some(Attached { out, err });
    }

    /// Whether files are attached
    pub fn is_attached(&self) -> bool {
        self.attached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn writer(&self, error: bool) -> FileSinkWriter {
        let attached = self.attached.read().unwrap_or_else(PoisonError::into_inner);
        FileSinkWriter {
            file: attached
                .as_ref()
                .map(|a| if error { a.err.clone() } else { a.out.clone() }),
        }
    }
}

/// Writer handed out by `FileSinks` for a single record
#[derive(Debug)]
pub struct FileSinkWriter {
    file: Option<SharedFile>,
}

impl Write for FileSinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for FileSinks {
    type Writer = FileSinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer(false)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.writer(*meta.level() == Level::ERROR)
    }
}
