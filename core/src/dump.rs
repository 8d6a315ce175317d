//! Forward-only readers over dump files.
//!
//! StackExchange dumps store one `<row .../>` element per record with every column as an
//! attribute. JSON Lines dumps store one object per line with the same column names.

use crate::error::{Error, Result};
use crate::model::{Kind, Record};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A lazy sequence of typed records that knows how far into its input it is.
pub trait RecordStream: Iterator<Item = Result<Record>> {
    fn byte_position(&self) -> u64;

    fn total_bytes(&self) -> Option<u64>;

    /// Rows dropped because they could not be turned into a typed record.
    fn skipped_rows(&self) -> u64 {
        0
    }

    fn percent_read(&self) -> f64 {
        match self.total_bytes() {
            Some(total) => crate::progress::percent_of(self.byte_position(), total),
            None => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Xml,
    JsonLines,
}

impl DumpFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "xml" => Some(DumpFormat::Xml),
            "jsonl" | "ndjson" => Some(DumpFormat::JsonLines),
            _ => None,
        }
    }
}

enum Source<R: BufRead> {
    Xml { reader: Reader<R>, buf: Vec<u8> },
    JsonLines { reader: R, line: Vec<u8>, position: u64 },
}

pub struct DumpReader<R: BufRead> {
    kind: Kind,
    source: Source<R>,
    total_bytes: Option<u64>,
    skipped_rows: u64,
    finished: bool,
}

impl DumpReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, kind: Kind) -> Result<Self> {
        let path = path.as_ref();
        let format = DumpFormat::detect(path).unwrap_or(DumpFormat::Xml);
        let file = File::open(path)?;
        let total = file.metadata()?.len();
        let reader = BufReader::with_capacity(1024 * 1024, file);
        Ok(Self::new(reader, kind, format, Some(total)))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(reader: R, kind: Kind, format: DumpFormat, total_bytes: Option<u64>) -> Self {
        let source = match format {
            DumpFormat::Xml => Source::Xml { reader: Reader::from_reader(reader), buf: Vec::with_capacity(8192) },
            DumpFormat::JsonLines => Source::JsonLines { reader, line: Vec::new(), position: 0 },
        };
        Self { kind, source, total_bytes, skipped_rows: 0, finished: false }
    }

    fn next_fields(&mut self) -> Result<Option<Map<String, Value>>> {
        match &mut self.source {
            Source::Xml { reader, buf } => loop {
                buf.clear();
                match reader.read_event_into(buf)? {
                    Event::Empty(ref e) | Event::Start(ref e) if e.name().as_ref() == b"row" => match row_attributes(e) {
                        Ok(fields) => return Ok(Some(fields)),
                        Err(err) => {
                            tracing::warn!(kind = %self.kind, offset = reader.buffer_position(), error = %err, "skipping unreadable row");
                            self.skipped_rows += 1;
                        }
                    },
                    Event::Eof => return Ok(None),
                    _ => {}
                }
            },
            Source::JsonLines { reader, line, position } => loop {
                line.clear();
                let n = reader.read_until(b'\n', line)?;
                if n == 0 {
                    return Ok(None);
                }
                *position += n as u64;
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<Value>(line) {
                    Ok(Value::Object(map)) => return Ok(Some(map)),
                    Ok(_) | Err(_) => {
                        tracing::warn!(kind = %self.kind, offset = *position, "skipping malformed JSON line");
                        self.skipped_rows += 1;
                    }
                }
            },
        }
    }
}

fn row_attributes(e: &BytesStart<'_>) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::Xml(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        fields.insert(key, Value::String(value));
    }
    Ok(fields)
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let fields = match self.next_fields() {
                Ok(Some(fields)) => fields,
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            match Record::from_fields(self.kind, fields) {
                Ok(record) => return Some(Ok(record)),
                Err(e) => {
                    tracing::warn!(kind = %self.kind, error = %e, "skipping row that does not form a record");
                    self.skipped_rows += 1;
                }
            }
        }
    }
}

impl<R: BufRead> RecordStream for DumpReader<R> {
    fn byte_position(&self) -> u64 {
        match &self.source {
            Source::Xml { reader, .. } => reader.buffer_position() as u64,
            Source::JsonLines { position, .. } => *position,
        }
    }

    fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    fn skipped_rows(&self) -> u64 {
        self.skipped_rows
    }
}

/// In-memory stream; position counts records handed out.
pub struct MemoryStream {
    records: std::vec::IntoIter<Record>,
    total: u64,
}

impl MemoryStream {
    pub fn new(records: Vec<Record>) -> Self {
        let total = records.len() as u64;
        Self { records: records.into_iter(), total }
    }
}

impl Iterator for MemoryStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(Ok)
    }
}

impl RecordStream for MemoryStream {
    fn byte_position(&self) -> u64 {
        self.total - self.records.len() as u64
    }

    fn total_bytes(&self) -> Option<u64> {
        Some(self.total)
    }
}

/// Directory holding one dump file per kind.
#[derive(Debug, Clone)]
pub struct DumpFiles {
    pub dir: PathBuf,
}

impl DumpFiles {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    /// `<Stem>.xml` or `<Stem>.jsonl`, file name compared case-insensitively.
    pub fn path(&self, kind: Kind) -> Result<PathBuf> {
        let candidates = [
            format!("{}.xml", kind.dump_stem()).to_ascii_lowercase(),
            format!("{}.jsonl", kind.dump_stem()).to_ascii_lowercase(),
        ];
        let mut found: Vec<PathBuf> = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_ascii_lowercase();
                candidates.contains(&name)
            })
            .map(|e| e.into_path())
            .collect();
        found.sort();
        found.into_iter().next().ok_or_else(|| Error::MissingPrerequisiteFile {
            kind,
            path: self.dir.join(format!("{}.xml", kind.dump_stem())),
        })
    }

    pub fn open(&self, kind: Kind) -> Result<DumpReader<BufReader<File>>> {
        let path = self.path(kind)?;
        tracing::debug!(%kind, path = %path.display(), "opening dump file");
        DumpReader::open(path, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const POSTS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<posts>
  <row Id="1" PostTypeId="1" Title="Off topic FAQ" Tags="&lt;faq&gt;" Body="&lt;p&gt;What&lt;/p&gt;" ViewCount="10" />
  <row Id="oops" PostTypeId="1" />
  <row Id="2" PostTypeId="2" ParentId="1" Body="answer" />
</posts>"#;

    #[test]
    fn reads_xml_rows_and_skips_bad_ones() {
        let total = POSTS.len() as u64;
        let mut reader = DumpReader::new(Cursor::new(POSTS), Kind::Post, DumpFormat::Xml, Some(total));
        let records: Vec<Record> = reader.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(reader.skipped_rows(), 1);
        let Record::Post(q) = &records[0] else { panic!("expected post") };
        assert_eq!(q.title.as_deref(), Some("Off topic FAQ"));
        assert_eq!(q.tags.as_deref(), Some("<faq>"));
        assert_eq!(q.view_count, Some(10));
        assert_eq!(reader.percent_read(), 100.0);
    }

    #[test]
    fn reads_json_lines() {
        let data = "{\"PostId\": 1, \"VoteTypeId\": 2}\n\nnot json\n{\"PostId\": \"3\", \"VoteTypeId\": \"3\"}\n";
        let mut reader = DumpReader::new(Cursor::new(data), Kind::Vote, DumpFormat::JsonLines, None);
        let records: Vec<Record> = reader.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(reader.skipped_rows(), 1);
        assert_eq!(reader.byte_position(), data.len() as u64);
    }

    #[test]
    fn bad_xml_row_does_not_end_the_stream() {
        let data = r#"<posts><row Id="1" /><row Id="2" Title="bad &bogus; entity" /><row Id="3" /></posts>"#;
        let mut reader = DumpReader::new(Cursor::new(data), Kind::Post, DumpFormat::Xml, None);
        let ids: Vec<_> = reader.by_ref().map(|r| r.unwrap().doc_id()).collect();
        assert_eq!(ids, vec![Some(1), Some(3)]);
        assert_eq!(reader.skipped_rows(), 1);
    }

    #[test]
    fn undecodable_json_line_does_not_end_the_stream() {
        let mut data = b"{\"PostId\": 1, \"VoteTypeId\": 2}\n".to_vec();
        data.extend_from_slice(b"{\"PostId\": \"\xff\xfe\"}\n");
        data.extend_from_slice(b"{\"PostId\": 3, \"VoteTypeId\": 3}\n");
        let total = data.len() as u64;
        let mut reader = DumpReader::new(Cursor::new(data), Kind::Vote, DumpFormat::JsonLines, Some(total));
        let records: Vec<Record> = reader.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(reader.skipped_rows(), 1);
        assert_eq!(reader.percent_read(), 100.0);
    }

    #[test]
    fn missing_dump_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("posts.XML"), POSTS).unwrap();
        let files = DumpFiles::new(dir.path());
        assert!(files.path(Kind::Post).is_ok());
        match files.path(Kind::Vote) {
            Err(Error::MissingPrerequisiteFile { kind, .. }) => assert_eq!(kind, Kind::Vote),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn memory_stream_tracks_position() {
        let mut s = MemoryStream::new(vec![Record::Vote(Default::default()), Record::Vote(Default::default())]);
        assert_eq!(s.percent_read(), 0.0);
        s.next();
        assert_eq!(s.percent_read(), 50.0);
    }
}
