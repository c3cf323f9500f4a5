use crate::domain::model::{LogRecord, Reading, TimestampZone, Verdict, LOG_HEADER};
use crate::domain::ports::ReadingSink;
use crate::utils::error::SinkError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// File operations the log needs: whole-buffer appends, syncs and truncation.
pub trait LogFile: Send {
    fn append_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn sync_data(&mut self) -> io::Result<()>;
    fn sync_all(&mut self) -> io::Result<()>;
    fn size(&self) -> io::Result<u64>;
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn append_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)
    }

    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Append-only CSV measurement log.
///
/// Every row is written with one `write_all` and synced to disk before `append` returns.
/// Bytes already in the file are never rewritten: a row that fails half-way is cut back to
/// the last committed length before the next attempt, and an existing file whose last line
/// was torn by a crash gets a newline before the first new row.
#[derive(Debug)]
pub struct CsvReadingSink<F: LogFile = File> {
    path: PathBuf,
    file: F,
    zone: TimestampZone,
    next_sequence: u64,
    committed_len: u64,
    needs_newline: bool,
    // a failed write may have left a partial row behind
    dirty: bool,
}

impl CsvReadingSink<File> {
    pub fn open<P: AsRef<Path>>(path: P, zone: TimestampZone) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| SinkError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io_err)?;
        Self::attach(path, file, zone)
    }
}

impl<F: LogFile> CsvReadingSink<F> {
    /// Takes over an already opened log at `path`: writes the header into an empty file,
    /// otherwise picks up the sequence where the file left off.
    fn attach(path: PathBuf, file: F, zone: TimestampZone) -> Result<Self, SinkError> {
        let io_err = |source| SinkError::Io {
            path: path.display().to_string(),
            source,
        };
        let len = file.size().map_err(io_err)?;

        let mut sink = Self {
            path: path.clone(),
            file,
            zone,
            next_sequence: 1,
            committed_len: len,
            needs_newline: false,
            dirty: false,
        };

        if len == 0 {
            sink.write_header()?;
            tracing::info!("📁 Created measurement log {}", path.display());
        } else {
            let last = last_sequence_number(&path).map_err(io_err)?;
            sink.next_sequence = last.map_or(1, |n| n + 1);
            sink.needs_newline = !ends_with_newline(&path).map_err(io_err)?;
            if sink.needs_newline {
                tracing::warn!("Measurement log {} ends with an incomplete line", path.display());
            }
            tracing::info!(
                "📁 Appending to {} (next sequence {})",
                path.display(),
                sink.next_sequence
            );
        }

        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn write_header(&mut self) -> Result<(), SinkError> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(LOG_HEADER)?;
        let bytes = writer.into_inner().map_err(|e| SinkError::Csv {
            message: e.to_string(),
        })?;
        self.write_durably(&bytes)?;
        self.committed_len += bytes.len() as u64;
        Ok(())
    }

    fn format_row(&self, record: &LogRecord) -> Result<Vec<u8>, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.serialize(record)?;
        writer.into_inner().map_err(|e| SinkError::Csv {
            message: e.to_string(),
        })
    }

    fn write_durably(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.file.append_all(bytes).map_err(|e| self.io_error(e))?;
        self.file.sync_data().map_err(|e| self.io_error(e))
    }

    /// Cuts off whatever a failed write left after the last committed row.
    fn rollback(&mut self) -> Result<(), SinkError> {
        let len = self.file.size().map_err(|e| self.io_error(e))?;
        if len > self.committed_len {
            tracing::debug!(
                "Removing {} bytes of a partial row from {}",
                len - self.committed_len,
                self.path.display()
            );
            self.file
                .set_len(self.committed_len)
                .map_err(|e| self.io_error(e))?;
            self.file.sync_data().map_err(|e| self.io_error(e))?;
        }
        self.dirty = false;
        Ok(())
    }
}

impl<F: LogFile> ReadingSink for CsvReadingSink<F> {
    fn append(&mut self, reading: &Reading, verdict: &Verdict) -> Result<u64, SinkError> {
        if self.dirty {
            self.rollback()?;
        }

        let sequence = self.next_sequence;
        let row = self.format_row(&LogRecord::new(sequence, reading, verdict, self.zone))?;

        let mut bytes = Vec::with_capacity(row.len() + 1);
        if self.needs_newline {
            bytes.push(b'\n');
        }
        bytes.extend_from_slice(&row);

        if let Err(e) = self.write_durably(&bytes) {
            self.dirty = true;
            if let Err(rollback) = self.rollback() {
                tracing::debug!("Rollback after failed write did not complete: {}", rollback);
            }
            return Err(e);
        }

        self.committed_len += bytes.len() as u64;
        self.needs_newline = false;
        self.next_sequence += 1;
        Ok(sequence)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.file.sync_all().map_err(|e| self.io_error(e))
    }
}

/// Highest sequence number in an existing log. Rows that do not start with a number
/// (header, torn or foreign lines) are skipped.
fn last_sequence_number(path: &Path) -> io::Result<Option<u64>> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut max = None;
    for record in reader.byte_records().flatten() {
        let sequence = record
            .get(0)
            .and_then(|field| std::str::from_utf8(field).ok())
            .and_then(|field| field.trim().parse::<u64>().ok());
        if let Some(sequence) = sequence {
            max = max.max(Some(sequence));
        }
    }
    Ok(max)
}

fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
