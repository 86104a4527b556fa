use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::thread;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error};

use crate::field::Field;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("logger has already been initialised")]
    AlreadyInitialised,
    #[error("logger has not been initialised yet")]
    NotInitialised,
    #[error("column name cannot be empty")]
    EmptyColumnName,
    #[error("column {0:?} already exists")]
    DuplicateColumn(String),
    #[error("no column named {0:?}")]
    UnknownColumn(String),
    #[error("cannot initialise a logger without columns")]
    NoColumns,
    #[error("log file path has no file name")]
    InvalidPath,
    #[error("existing log file {0:?} has a malformed header")]
    MalformedHeader(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

type Row = Vec<Field>;

struct FileState {
    writer: BufWriter<File>,
    header_written: bool,
}

/// CSV logger whose hot path never touches the disk.
///
/// `set_column_value` and `log_and_clear` only move data between in-memory
/// rows and a pending queue; `save_to_disk` hands the queue to a background
/// thread. The queue and the file handle sit behind separate locks so a
/// frame can keep logging while an earlier flush is still writing.
pub struct AsyncCsvLogger {
    path: PathBuf,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    current: Row,
    initialised: bool,
    pending: Arc<Mutex<VecDeque<Row>>>,
    file: Arc<Mutex<FileState>>,
}

impl AsyncCsvLogger {
    /// Opens (or creates) the log file at `path`.
    ///
    /// A `.csv` extension is appended when missing. If the file already has
    /// a header line the column set is adopted from it and the logger comes
    /// back pre-initialised, appending below the existing rows; the header
    /// is then never written again for the lifetime of the file.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, LoggerError> {
        let mut path = path.into();
        match path.file_name() {
            None => return Err(LoggerError::InvalidPath),
            Some(name) if name.is_empty() => return Err(LoggerError::InvalidPath),
            Some(_) => {}
        }
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            path.as_mut_os_string().push(".csv");
        }

        let mut columns = Vec::new();
        let mut header_written = false;
        if path.exists() {
            if let Some(header) = read_header_line(&path)? {
                columns = parse_header(&header, &path)?;
                header_written = true;
            }
        }

        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let initialised = header_written;
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let current = vec![Field::Empty; columns.len()];
        debug!(path = %path.display(), reopened = initialised, "log file opened");
        Ok(Self {
            path,
            columns,
            index,
            current,
            initialised,
            pending: Arc::new(Mutex::new(VecDeque::new())),
            file: Arc::new(Mutex::new(FileState {
                writer: BufWriter::new(file),
                header_written,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_been_initialised(&self) -> bool {
        self.initialised
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn add_column(&mut self, name: impl Into<String>) -> Result<(), LoggerError> {
        let name = name.into();
        self.check_addable(&name)?;
        self.push_column(name);
        Ok(())
    }

    /// Adds a batch of columns. The whole batch is validated before any
    /// column is added, so a failure leaves the logger unchanged.
    pub fn add_columns<I, S>(&mut self, names: I) -> Result<(), LoggerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        for (i, name) in names.iter().enumerate() {
            self.check_addable(name)?;
            if names[..i].contains(name) {
                return Err(LoggerError::DuplicateColumn(name.clone()));
            }
        }
        for name in names {
            self.push_column(name);
        }
        Ok(())
    }

    /// Freezes the column set. Rows can only be filled and queued after this.
    pub fn initialise(&mut self) -> Result<(), LoggerError> {
        if self.initialised {
            return Err(LoggerError::AlreadyInitialised);
        }
        if self.columns.is_empty() {
            return Err(LoggerError::NoColumns);
        }
        self.initialised = true;
        Ok(())
    }

    pub fn set_column_value(
        &mut self,
        name: &str,
        value: impl Into<Field>,
    ) -> Result<(), LoggerError> {
        if !self.initialised {
            return Err(LoggerError::NotInitialised);
        }
        let slot = *self
            .index
            .get(name)
            .ok_or_else(|| LoggerError::UnknownColumn(name.to_owned()))?;
        self.current[slot] = value.into();
        Ok(())
    }

    /// Queues the current row and resets it to all-empty cells.
    pub fn log_and_clear(&mut self) -> Result<(), LoggerError> {
        if !self.initialised {
            return Err(LoggerError::NotInitialised);
        }
        let row = std::mem::replace(&mut self.current, vec![Field::Empty; self.columns.len()]);
        self.pending.lock().push_back(row);
        Ok(())
    }

    pub fn has_unsaved_data(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Drops all queued rows. Returns whether there was anything to drop.
    pub fn clear_unsaved_data(&mut self) -> bool {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return false;
        }
        pending.clear();
        true
    }

    /// Hands the queued rows to a background thread for writing.
    ///
    /// With an empty queue this is a no-op that completes immediately; in
    /// particular a file never gains a header before its first real row.
    /// Concurrent flushes serialize on the file lock, and rows leave the
    /// queue only after they have been written.
    pub fn save_to_disk(&self) -> FlushHandle {
        if !self.has_unsaved_data() {
            return FlushHandle::complete_now(0);
        }
        let pending = Arc::clone(&self.pending);
        let file = Arc::clone(&self.file);
        let header = self.columns.join(",");
        let path = self.path.clone();
        let (tx, rx) = channel();
        thread::spawn(move || {
            let outcome = write_pending(&pending, &file, &header);
            if let Err(err) = &outcome {
                error!(path = %path.display(), %err, "flush failed");
            }
            let _ = tx.send(outcome);
        });
        FlushHandle::pending(rx)
    }

    fn check_addable(&self, name: &str) -> Result<(), LoggerError> {
        if self.initialised {
            return Err(LoggerError::AlreadyInitialised);
        }
        if name.is_empty() {
            return Err(LoggerError::EmptyColumnName);
        }
        if self.index.contains_key(name) {
            return Err(LoggerError::DuplicateColumn(name.to_owned()));
        }
        Ok(())
    }

    fn push_column(&mut self, name: String) {
        self.index.insert(name.clone(), self.columns.len());
        self.columns.push(name);
        self.current.push(Field::Empty);
    }
}

fn write_pending(
    pending: &Mutex<VecDeque<Row>>,
    file: &Mutex<FileState>,
    header: &str,
) -> io::Result<usize> {
    let mut state = file.lock();
    if !state.header_written {
        writeln!(state.writer, "{header}")?;
        state.header_written = true;
    }
    let mut written = 0;
    loop {
        let row = pending.lock().front().cloned();
        let Some(row) = row else { break };
        let mut line = String::new();
        for (i, field) in row.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            field.render_into(&mut line);
        }
        writeln!(state.writer, "{line}")?;
        pending.lock().pop_front();
        written += 1;
    }
    state.writer.flush()?;
    debug!(rows = written, "flush complete");
    Ok(written)
}

fn read_header_line(path: &Path) -> Result<Option<String>, LoggerError> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    match lines.next() {
        Some(line) => {
            let line = line?;
            if line.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(line))
            }
        }
        None => Ok(None),
    }
}

fn parse_header(header: &str, path: &Path) -> Result<Vec<String>, LoggerError> {
    let columns: Vec<String> = header.split(',').map(strip_wrapping_quotes).collect();
    if columns.iter().any(String::is_empty) {
        return Err(LoggerError::MalformedHeader(path.to_owned()));
    }
    Ok(columns)
}

fn strip_wrapping_quotes(column: &str) -> String {
    let column = column.trim();
    column
        .strip_prefix('"')
        .and_then(|c| c.strip_suffix('"'))
        .unwrap_or(column)
        .to_owned()
}

/// Completion handle for one background flush.
///
/// Poll `is_complete` from a frame loop, or `wait` to block. A handle from
/// an empty-queue flush is complete from the start.
#[derive(Debug)]
pub struct FlushHandle {
    rx: Option<Receiver<io::Result<usize>>>,
    outcome: Option<io::Result<usize>>,
}

impl FlushHandle {
    fn complete_now(rows: usize) -> Self {
        Self {
            rx: None,
            outcome: Some(Ok(rows)),
        }
    }

    fn pending(rx: Receiver<io::Result<usize>>) -> Self {
        Self {
            rx: Some(rx),
            outcome: None,
        }
    }

    pub fn is_complete(&mut self) -> bool {
        if self.outcome.is_some() {
            return true;
        }
        let Some(rx) = &self.rx else { return true };
        match rx.try_recv() {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.outcome = Some(Err(io::Error::other("flush worker vanished")));
                true
            }
        }
    }

    /// Result of the flush, once complete.
    pub fn outcome(&self) -> Option<&io::Result<usize>> {
        self.outcome.as_ref()
    }

    /// Blocks until the flush finishes and returns the rows written.
    pub fn wait(mut self) -> io::Result<usize> {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        match self.rx {
            Some(rx) => rx
                .recv()
                .unwrap_or_else(|_| Err(io::Error::other("flush worker vanished"))),
            None => Ok(0),
        }
    }
}
