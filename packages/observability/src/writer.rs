//! Append-only file writer for JSONL logs.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Line-flushed writer shared by every log event.
#[derive(Clone)]
pub struct FileLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl FileLogWriter {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for FileLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        // Readers tailing the file must see whole lines.
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// `MakeWriter` adapter handing out clones of one [`FileLogWriter`].
#[derive(Clone)]
pub struct WriterFactory {
    writer: FileLogWriter,
}

impl WriterFactory {
    pub fn new(writer: FileLogWriter) -> Self {
        Self { writer }
    }
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = FileLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::tempdir;

    #[test]
    fn test_file_log_writer_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("muxd.jsonl");

        let mut writer = FileLogWriter::new(&path).unwrap();
        writer.write_all(b"first\n").unwrap();

        let mut again = FileLogWriter::new(&path).unwrap();
        again.write_all(b"second\n").unwrap();

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_factory_writers_share_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.jsonl");
        let factory = WriterFactory::new(FileLogWriter::new(&path).unwrap());

        factory.make_writer().write_all(b"a\n").unwrap();
        factory.make_writer().write_all(b"b\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }
}
