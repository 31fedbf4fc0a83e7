//! Streaming spreadsheet reader
//!
//! Yields rows in fixed-size chunks from a single forward pass over the input.
//! The first row is the header row; only the first worksheet is read.
//!
//! # Formats
//! - `.csv` / `.txt`: delimited text, delimiter sniffed from the first lines
//! - `.tsv`: tab-delimited text
//! - `.xlsx` / `.xlsm`: cell-streaming reader on a dedicated thread feeding a
//!   bounded channel, so the sheet is never held in memory
//! - `.xls`: legacy workbook, read one sheet at a time (format caps rows at 65 536)
//!
//! Rows that cannot be decoded (invalid UTF-8, error cells) are skipped and
//! counted. Rows whose cells are all blank are ignored and not counted.

use super::column_detector::{ColumnDetector, DetectedColumn, DetectionMethod};
use crate::config::ReaderSettings;
use crate::error::{ErrorKind, PipelineError, PipelineResult};
use crate::models::{CellValue, RawRow};
use calamine::{open_workbook, open_workbook_auto, Data, DataRef, Reader, Xlsx};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rows buffered between the workbook thread and the reader
const XLSX_CHANNEL_ROWS: usize = 1024;

/// Lines inspected when sniffing a delimiter
const SNIFF_LINES: usize = 5;

/// One row pulled from a row source
#[derive(Debug)]
enum RowEvent {
    Row(Vec<CellValue>),
    Skipped { reason: String },
}

type RowSource = Box<dyn Iterator<Item = PipelineResult<RowEvent>> + Send>;

/// Chunked row reader with comment column detection
pub struct ChunkReader {
    rows: RowSource,
    replay: VecDeque<RowEvent>,
    headers: Arc<[String]>,
    column: DetectedColumn,
    chunk_rows: usize,
    rows_seen: usize,
    total_rows: usize,
    skipped_rows: usize,
    finished: bool,
}

impl std::fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReader")
            .field("headers", &self.headers)
            .field("column", &self.column)
            .field("total_rows", &self.total_rows)
            .field("skipped_rows", &self.skipped_rows)
            .finish()
    }
}

impl ChunkReader {
    /// Open a file, choosing the format by extension
    pub fn open(path: &Path, settings: &ReaderSettings) -> PipelineResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        info!(path = %path.display(), format = %extension, "Opening input");

        match extension.as_str() {
            "csv" | "txt" => {
                let mut reader = BufReader::new(File::open(path)?);
                let delimiter = sniff_delimiter(&mut reader)?;
                debug!(delimiter = %(delimiter as char).escape_default(), "Sniffed delimiter");
                Self::from_csv(reader, delimiter, settings)
            }
            "tsv" => Self::from_csv(BufReader::new(File::open(path)?), b'\t', settings),
            "xlsx" | "xlsm" => Self::from_source(Box::new(XlsxRows::spawn(path.to_path_buf())?), settings),
            "xls" => Self::from_source(Box::new(XlsRows::open(path)?), settings),
            "" => Err(PipelineError::UnsupportedFormat(format!(
                "{} has no file extension",
                path.display()
            ))),
            other => Err(PipelineError::UnsupportedFormat(format!(".{}", other))),
        }
    }

    /// Read delimited text from any forward-only reader
    pub fn from_csv<R>(reader: R, delimiter: u8, settings: &ReaderSettings) -> PipelineResult<Self>
    where
        R: Read + Send + 'static,
    {
        let records = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(reader)
            .into_byte_records();

        Self::from_source(
            Box::new(CsvRows {
                records,
                header_pending: true,
            }),
            settings,
        )
    }

    fn from_source(mut rows: RowSource, settings: &ReaderSettings) -> PipelineResult<Self> {
        let headers: Vec<String> = match rows.next().transpose()? {
            Some(RowEvent::Row(cells)) => cells
                .iter()
                .map(|c| c.as_text().trim_start_matches('\u{feff}').trim().to_string())
                .collect(),
            Some(RowEvent::Skipped { reason }) => {
                return Err(PipelineError::Spreadsheet(format!(
                    "header row could not be decoded: {}",
                    reason
                )))
            }
            None => return Err(PipelineError::EmptyInput),
        };

        if headers.iter().all(|h| h.is_empty()) {
            return Err(PipelineError::EmptyInput);
        }

        let detector = ColumnDetector::new(settings);
        let mut replay = VecDeque::new();

        let column = match detector.by_name(&headers) {
            Some(index) => DetectedColumn {
                index,
                name: headers[index].clone(),
                method: DetectionMethod::HeaderName,
            },
            None => {
                // Buffer a sample; every buffered event is replayed later
                let mut sample = Vec::new();
                while sample.len() < settings.sample_rows {
                    match rows.next().transpose()? {
                        Some(RowEvent::Row(cells)) => {
                            if !cells.iter().all(CellValue::is_blank) {
                                sample.push(cells.clone());
                            }
                            replay.push_back(RowEvent::Row(cells));
                        }
                        Some(skipped) => replay.push_back(skipped),
                        None => break,
                    }
                }
                detector.detect(&headers, &sample)?
            }
        };

        info!(
            column = %column.name,
            index = column.index,
            method = ?column.method,
            headers = headers.len(),
            "Detected comment column"
        );

        Ok(Self {
            rows,
            replay,
            headers: headers.into(),
            column,
            chunk_rows: settings.chunk_rows.max(1),
            rows_seen: 0,
            total_rows: 0,
            skipped_rows: 0,
            finished: false,
        })
    }

    /// Next batch of at most `chunk_rows` rows; `None` once exhausted
    pub fn next_chunk(&mut self) -> PipelineResult<Option<Vec<RawRow>>> {
        if self.finished {
            return Ok(None);
        }

        let mut chunk = Vec::with_capacity(self.chunk_rows);

        while chunk.len() < self.chunk_rows {
            let event = match self.replay.pop_front() {
                Some(event) => event,
                None => match self.rows.next() {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        self.finished = true;
                        return Err(e);
                    }
                    None => {
                        self.finished = true;
                        break;
                    }
                },
            };
            self.rows_seen += 1;

            match event {
                RowEvent::Row(cells) => {
                    if cells.iter().all(CellValue::is_blank) {
                        continue;
                    }
                    self.total_rows += 1;
                    chunk.push(RawRow::new(Arc::clone(&self.headers), cells, self.column.index));
                }
                RowEvent::Skipped { reason } => {
                    self.total_rows += 1;
                    self.skipped_rows += 1;
                    // +1 for the header row
                    warn!(
                        kind = ?ErrorKind::RowDecode,
                        row = self.rows_seen + 1,
                        reason = %reason,
                        "Skipping undecodable row"
                    );
                }
            }
        }

        if chunk.is_empty() && self.finished {
            return Ok(None);
        }
        Ok(Some(chunk))
    }

    /// Column names from the header row
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Detected comment column
    pub fn comment_column(&self) -> &DetectedColumn {
        &self.column
    }

    /// Data rows read so far (skipped rows included, blank rows excluded)
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Rows skipped because they could not be decoded
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }
}

impl Iterator for ChunkReader {
    type Item = PipelineResult<Vec<RawRow>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Pick the most frequent of tab, comma and semicolon in the first lines
///
/// Peeks through the buffer without consuming it. Defaults to comma.
fn sniff_delimiter<R: Read>(reader: &mut BufReader<R>) -> PipelineResult<u8> {
    let buffer = reader.fill_buf()?;
    let text = String::from_utf8_lossy(buffer);

    for line in text.lines().take(SNIFF_LINES) {
        if line.trim().is_empty() {
            continue;
        }

        let counts = [
            (b',', line.matches(',').count()),
            (b';', line.matches(';').count()),
            (b'\t', line.matches('\t').count()),
        ];

        if let Some((delimiter, count)) = counts.iter().max_by_key(|(_, count)| *count) {
            if *count > 0 {
                return Ok(*delimiter);
            }
        }
    }

    Ok(b',')
}

/// Delimited text rows
struct CsvRows<R: Read> {
    records: csv::ByteRecordsIntoIter<R>,
    header_pending: bool,
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = PipelineResult<RowEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Some(Err(e.into())),
            Err(e) => {
                return Some(Ok(RowEvent::Skipped {
                    reason: e.to_string(),
                }))
            }
        };

        // Header names are decoded lossily; data rows must be valid UTF-8
        if std::mem::take(&mut self.header_pending) {
            let cells = record
                .iter()
                .map(|field| text_cell(String::from_utf8_lossy(field).into_owned()))
                .collect();
            return Some(Ok(RowEvent::Row(cells)));
        }

        let mut cells = Vec::with_capacity(record.len());
        for (col, field) in record.iter().enumerate() {
            match std::str::from_utf8(field) {
                Ok(s) => cells.push(text_cell(s.to_string())),
                Err(e) => {
                    return Some(Ok(RowEvent::Skipped {
                        reason: format!("column {}: {}", col + 1, e),
                    }))
                }
            }
        }
        Some(Ok(RowEvent::Row(cells)))
    }
}

fn text_cell(s: String) -> CellValue {
    if s.is_empty() {
        CellValue::Blank
    } else {
        CellValue::Text(s)
    }
}

/// `.xlsx` rows streamed from a dedicated thread
struct XlsxRows {
    receiver: Receiver<PipelineResult<RowEvent>>,
}

impl XlsxRows {
    fn spawn(path: PathBuf) -> PipelineResult<Self> {
        let (sender, receiver) = sync_channel(XLSX_CHANNEL_ROWS);

        std::thread::Builder::new()
            .name("xlsx-reader".to_string())
            .spawn(move || {
                if let Err(e) = stream_xlsx(&path, &sender) {
                    // Receiver may already be gone if the run was cancelled
                    let _ = sender.send(Err(e));
                }
            })?;

        Ok(Self { receiver })
    }
}

impl Iterator for XlsxRows {
    type Item = PipelineResult<RowEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        // Disconnected means the thread finished
        self.receiver.recv().ok()
    }
}

/// Row being assembled from the cell stream
struct PendingRow {
    index: u32,
    cells: Vec<CellValue>,
    error: Option<String>,
}

impl PendingRow {
    fn new(index: u32) -> Self {
        Self {
            index,
            cells: Vec::new(),
            error: None,
        }
    }

    fn into_event(self) -> RowEvent {
        match self.error {
            Some(reason) => RowEvent::Skipped { reason },
            None => RowEvent::Row(self.cells),
        }
    }
}

/// Stream the first worksheet cell by cell, sending one event per row
///
/// Returns `Ok` early when the receiving side hangs up.
fn stream_xlsx(path: &Path, sender: &SyncSender<PipelineResult<RowEvent>>) -> PipelineResult<()> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(PipelineError::EmptyInput)?;

    debug!(sheet = %sheet, "Streaming worksheet");

    let mut cells = workbook.worksheet_cells_reader(&sheet)?;
    let mut pending: Option<PendingRow> = None;

    while let Some(cell) = cells.next_cell()? {
        let (row, col) = cell.get_position();

        let current = match pending.take() {
            Some(current) if current.index == row => current,
            Some(done) => {
                if sender.send(Ok(done.into_event())).is_err() {
                    return Ok(());
                }
                PendingRow::new(row)
            }
            None => PendingRow::new(row),
        };
        let current = pending.insert(current);

        let col = col as usize;
        if current.cells.len() < col {
            current.cells.resize(col, CellValue::Blank);
        }
        match data_ref_cell(cell.get_value()) {
            Ok(value) => current.cells.push(value),
            Err(reason) => {
                current.cells.push(CellValue::Blank);
                current
                    .error
                    .get_or_insert_with(|| format!("row {} column {}: {}", row + 1, col + 1, reason));
            }
        }
    }

    if let Some(done) = pending {
        let _ = sender.send(Ok(done.into_event()));
    }
    Ok(())
}

fn data_ref_cell(value: &DataRef<'_>) -> Result<CellValue, String> {
    Ok(match value {
        DataRef::Int(i) => CellValue::Number(*i as f64),
        DataRef::Float(f) => CellValue::Number(*f),
        DataRef::String(s) => text_cell(s.clone()),
        DataRef::SharedString(s) => text_cell(s.to_string()),
        DataRef::Bool(b) => CellValue::Bool(*b),
        DataRef::DateTime(dt) => CellValue::DateTime(dt.as_f64().to_string()),
        DataRef::DateTimeIso(s) | DataRef::DurationIso(s) => CellValue::DateTime(s.clone()),
        DataRef::Error(e) => return Err(format!("error cell {:?}", e)),
        DataRef::Empty => CellValue::Blank,
    })
}

fn data_cell(value: &Data) -> Result<CellValue, String> {
    Ok(match value {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => text_cell(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::DateTime(s.clone()),
        Data::Error(e) => return Err(format!("error cell {:?}", e)),
        Data::Empty => CellValue::Blank,
    })
}

/// Legacy `.xls` rows from the first sheet
struct XlsRows {
    rows: std::vec::IntoIter<RowEvent>,
}

impl XlsRows {
    fn open(path: &Path) -> PipelineResult<Self> {
        let mut workbook = open_workbook_auto(path)?;
        let sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(PipelineError::EmptyInput)?;
        let range = workbook.worksheet_range(&sheet)?;

        let rows: Vec<RowEvent> = range
            .rows()
            .enumerate()
            .map(|(idx, row)| {
                let mut cells = Vec::with_capacity(row.len());
                for (col, value) in row.iter().enumerate() {
                    match data_cell(value) {
                        Ok(cell) => cells.push(cell),
                        Err(reason) => {
                            return RowEvent::Skipped {
                                reason: format!("row {} column {}: {}", idx + 1, col + 1, reason),
                            }
                        }
                    }
                }
                RowEvent::Row(cells)
            })
            .collect();

        debug!(sheet = %sheet, rows = rows.len(), "Loaded legacy worksheet");
        Ok(Self {
            rows: rows.into_iter(),
        })
    }
}

impl Iterator for XlsRows {
    type Item = PipelineResult<RowEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(Ok)
    }
}
