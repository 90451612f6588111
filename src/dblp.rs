//! Streaming reader for the DBLP XML dump.
//!
//! The dump is a single `<dblp>` root holding millions of record elements
//! (`<article>`, `<inproceedings>`, `<book>`, ...). [`RecordStream`] walks it
//! event by event and yields one [`PublicationRecord`] per usable
//! `<inproceedings>` element; nothing but the record currently open is held
//! in memory.
//!
//! ```xml
//! <dblp>
//!   <inproceedings key="conf/iclr/Smith20">
//!     <author>Alice Smith</author>
//!     <author>Bob Jones</author>
//!     <title>...</title>
//!     <year>2020</year>
//!     <booktitle>ICLR</booktitle>
//!   </inproceedings>
//! </dblp>
//! ```

use std::{
    borrow::Cow,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use flate2::read::MultiGzDecoder;
use indicatif::ProgressBar;
use quick_xml::{
    events::{BytesText, Event},
    Reader,
};

use crate::error::{IclrError, Result};

const CONFERENCE_PAPER_TAG: &[u8] = b"inproceedings";
const YEAR_TAG: &[u8] = b"year";
const VENUE_TAG: &[u8] = b"booktitle";
const AUTHOR_TAG: &[u8] = b"author";

// <dblp> is depth 1, its record children depth 2, their fields depth 3.
const RECORD_DEPTH: usize = 2;
const FIELD_DEPTH: usize = 3;

const READ_BUFFER_BYTES: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationRecord {
    pub year: i32,
    pub venue: String,
    pub authors: Vec<String>,
}

/// Per-stream tallies of what was seen and why records were dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseCounters {
    pub elements_seen: u64,
    pub conference_papers: u64,
    pub missing_year: u64,
    pub invalid_year: u64,
    pub missing_venue: u64,
    pub records_yielded: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year,
    Venue,
    Author,
}

#[derive(Debug, Default)]
struct PendingRecord {
    year: Option<String>,
    venue: Option<String>,
    authors: Vec<String>,
}

impl PendingRecord {
    fn finish(self, counters: &mut ParseCounters) -> Option<PublicationRecord> {
        let year_text = match self.year {
            Some(text) if !text.is_empty() => text,
            _ => {
                counters.missing_year += 1;
                return None;
            }
        };
        let venue = match self.venue {
            Some(text) if !text.is_empty() => text,
            _ => {
                counters.missing_venue += 1;
                return None;
            }
        };
        let year = match year_text.parse::<i32>() {
            Ok(year) => year,
            Err(_) => {
                counters.invalid_year += 1;
                return None;
            }
        };
        counters.records_yielded += 1;
        Some(PublicationRecord {
            year,
            venue,
            authors: self.authors,
        })
    }
}

#[derive(Debug, Default)]
struct ParseState {
    depth: usize,
    saw_root: bool,
    current: Option<PendingRecord>,
    field: Option<Field>,
    text: String,
    counters: ParseCounters,
}

impl ParseState {
    fn start(&mut self, name: &[u8]) {
        self.depth += 1;
        match self.depth {
            1 => self.saw_root = true,
            RECORD_DEPTH => {
                self.counters.elements_seen += 1;
                if name == CONFERENCE_PAPER_TAG {
                    self.counters.conference_papers += 1;
                    self.current = Some(PendingRecord::default());
                }
            }
            FIELD_DEPTH if self.current.is_some() => {
                self.field = field_for(name);
                self.text.clear();
            }
            _ => {}
        }
    }

    // Self-closing elements carry no text: an empty record is dropped and an
    // empty field is ignored.
    fn empty(&mut self, name: &[u8]) {
        if self.depth == 0 {
            self.saw_root = true;
        } else if self.depth + 1 == RECORD_DEPTH {
            self.counters.elements_seen += 1;
            if name == CONFERENCE_PAPER_TAG {
                self.counters.conference_papers += 1;
                PendingRecord::default().finish(&mut self.counters);
            }
        }
    }

    fn text(&mut self, text: &BytesText<'_>) {
        if self.field.is_none() {
            return;
        }
        match text.unescape_with(resolve_entity) {
            Ok(unescaped) => self.text.push_str(&unescaped),
            Err(_) => self.text.push_str(&String::from_utf8_lossy(text)),
        }
    }

    fn cdata(&mut self, raw: &[u8]) {
        if self.field.is_some() {
            self.text.push_str(&String::from_utf8_lossy(raw));
        }
    }

    fn end(&mut self) -> Option<PublicationRecord> {
        let closing = self.depth;
        self.depth = self.depth.saturating_sub(1);
        match closing {
            FIELD_DEPTH => {
                if let (Some(field), Some(record)) = (self.field.take(), self.current.as_mut()) {
                    let value = self.text.trim();
                    match field {
                        Field::Year if record.year.is_none() => record.year = Some(value.to_string()),
                        Field::Venue if record.venue.is_none() => record.venue = Some(value.to_string()),
                        Field::Author if !value.is_empty() => record.authors.push(value.to_string()),
                        _ => {}
                    }
                }
                self.text.clear();
                None
            }
            RECORD_DEPTH => self
                .current
                .take()
                .and_then(|pending| pending.finish(&mut self.counters)),
            _ => None,
        }
    }
}

fn field_for(name: &[u8]) -> Option<Field> {
    match name {
        YEAR_TAG => Some(Field::Year),
        VENUE_TAG => Some(Field::Venue),
        AUTHOR_TAG => Some(Field::Author),
        _ => None,
    }
}

/// Lazy, finite, non-restartable sequence of conference-paper records.
///
/// Record-level problems (no year, non-numeric year, no venue) drop the
/// record and are tallied in [`ParseCounters`]. Structural problems end the
/// stream with a single [`IclrError::MalformedInput`].
pub struct RecordStream<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: ParseState,
    finished: bool,
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Reader::from_reader(reader),
            buf: Vec::with_capacity(1024),
            state: ParseState::default(),
            finished: false,
        }
    }

    pub fn counters(&self) -> ParseCounters {
        self.state.counters
    }

    fn malformed(&self, reason: impl Into<String>) -> IclrError {
        IclrError::MalformedInput {
            position: self.reader.buffer_position() as u64,
            reason: reason.into(),
        }
    }
}

enum Step {
    Continue,
    Record(PublicationRecord),
    Eof,
    Failed(String),
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = Result<PublicationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            self.buf.clear();
            let Self { reader, buf, state, .. } = self;
            let step = match reader.read_event_into(buf) {
                Ok(Event::Start(e)) => {
                    state.start(e.name().as_ref());
                    Step::Continue
                }
                Ok(Event::Empty(e)) => {
                    state.empty(e.name().as_ref());
                    Step::Continue
                }
                Ok(Event::Text(e)) => {
                    state.text(&e);
                    Step::Continue
                }
                Ok(Event::CData(e)) => {
                    state.cdata(&e);
                    Step::Continue
                }
                Ok(Event::End(_)) => state.end().map_or(Step::Continue, Step::Record),
                Ok(Event::Eof) => Step::Eof,
                Ok(_) => Step::Continue,
                Err(e) => Step::Failed(e.to_string()),
            };

            match step {
                Step::Continue => continue,
                Step::Record(record) => return Some(Ok(record)),
                Step::Eof => {
                    self.finished = true;
                    if !self.state.saw_root {
                        return Some(Err(self.malformed("document has no root element")));
                    }
                    if self.state.depth == 0 {
                        return None;
                    }
                    let reason = format!("document ended with {} unclosed element(s)", self.state.depth);
                    return Some(Err(self.malformed(reason)));
                }
                Step::Failed(reason) => {
                    self.finished = true;
                    return Some(Err(self.malformed(reason)));
                }
            }
        }
    }
}

/// Opens a dump file for streaming. Paths ending in `.gz` are gunzipped on
/// the fly; anything else is read as plain XML. `progress` tracks bytes read
/// from disk (compressed bytes for `.gz`).
pub fn open_dump(path: &Path, progress: &ProgressBar) -> Result<RecordStream<Box<dyn BufRead + Send>>> {
    let file = File::open(path).map_err(|e| IclrError::io(path, e))?;
    let len = file.metadata().map_err(|e| IclrError::io(path, e))?.len();
    progress.set_length(len);
    let tracked = progress.wrap_read(file);

    let is_gzip = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("gz"));
    let reader: Box<dyn BufRead + Send> = if is_gzip {
        Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, MultiGzDecoder::new(tracked)))
    } else {
        Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, tracked))
    };
    Ok(RecordStream::new(reader))
}

fn resolve_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        _ => LATIN1_ENTITIES
            .iter()
            .find(|(name, _)| *name == entity)
            .map(|(_, value)| *value),
    }
}

// Named ISO 8859-1 entities declared in dblp.dtd (U+00A0..=U+00FF).
static LATIN1_ENTITIES: [(&str, &str); 96] = [
    ("nbsp", "\u{a0}"), ("iexcl", "\u{a1}"), ("cent", "\u{a2}"), ("pound", "\u{a3}"),
    ("curren", "\u{a4}"), ("yen", "\u{a5}"), ("brvbar", "\u{a6}"), ("sect", "\u{a7}"),
    ("uml", "\u{a8}"), ("copy", "\u{a9}"), ("ordf", "\u{aa}"), ("laquo", "\u{ab}"),
    ("not", "\u{ac}"), ("shy", "\u{ad}"), ("reg", "\u{ae}"), ("macr", "\u{af}"),
    ("deg", "\u{b0}"), ("plusmn", "\u{b1}"), ("sup2", "\u{b2}"), ("sup3", "\u{b3}"),
    ("acute", "\u{b4}"), ("micro", "\u{b5}"), ("para", "\u{b6}"), ("middot", "\u{b7}"),
    ("cedil", "\u{b8}"), ("sup1", "\u{b9}"), ("ordm", "\u{ba}"), ("raquo", "\u{bb}"),
    ("frac14", "\u{bc}"), ("frac12", "\u{bd}"), ("frac34", "\u{be}"), ("iquest", "\u{bf}"),
    ("Agrave", "\u{c0}"), ("Aacute", "\u{c1}"), ("Acirc", "\u{c2}"), ("Atilde", "\u{c3}"),
    ("Auml", "\u{c4}"), ("Aring", "\u{c5}"), ("AElig", "\u{c6}"), ("Ccedil", "\u{c7}"),
    ("Egrave", "\u{c8}"), ("Eacute", "\u{c9}"), ("Ecirc", "\u{ca}"), ("Euml", "\u{cb}"),
    ("Igrave", "\u{cc}"), ("Iacute", "\u{cd}"), ("Icirc", "\u{ce}"), ("Iuml", "\u{cf}"),
    ("ETH", "\u{d0}"), ("Ntilde", "\u{d1}"), ("Ograve", "\u{d2}"), ("Oacute", "\u{d3}"),
    ("Ocirc", "\u{d4}"), ("Otilde", "\u{d5}"), ("Ouml", "\u{d6}"), ("times", "\u{d7}"),
    ("Oslash", "\u{d8}"), ("Ugrave", "\u{d9}"), ("Uacute", "\u{da}"), ("Ucirc", "\u{db}"),
    ("Uuml", "\u{dc}"), ("Yacute", "\u{dd}"), ("THORN", "\u{de}"), ("szlig", "\u{df}"),
    ("agrave", "\u{e0}"), ("aacute", "\u{e1}"), ("acirc", "\u{e2}"), ("atilde", "\u{e3}"),
    ("auml", "\u{e4}"), ("aring", "\u{e5}"), ("aelig", "\u{e6}"), ("ccedil", "\u{e7}"),
    ("egrave", "\u{e8}"), ("eacute", "\u{e9}"), ("ecirc", "\u{ea}"), ("euml", "\u{eb}"),
    ("igrave", "\u{ec}"), ("iacute", "\u{ed}"), ("icirc", "\u{ee}"), ("iuml", "\u{ef}"),
    ("eth", "\u{f0}"), ("ntilde", "\u{f1}"), ("ograve", "\u{f2}"), ("oacute", "\u{f3}"),
    ("ocirc", "\u{f4}"), ("otilde", "\u{f5}"), ("ouml", "\u{f6}"), ("divide", "\u{f7}"),
    ("oslash", "\u{f8}"), ("ugrave", "\u{f9}"), ("uacute", "\u{fa}"), ("ucirc", "\u{fb}"),
    ("uuml", "\u{fc}"), ("yacute", "\u{fd}"), ("thorn", "\u{fe}"), ("yuml", "\u{ff}"),
];

/// Decodes an entity-bearing string the same way element text is decoded.
pub fn unescape_text(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape_with(raw, resolve_entity).unwrap_or(Cow::Borrowed(raw))
}
