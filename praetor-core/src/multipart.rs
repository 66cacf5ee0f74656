//! Streaming `multipart/form-data` decoder.
//!
//! The body is consumed one line at a time (lines longer than
//! [`MultipartLimits::chunk_size`] are split), so a file part is never held
//! in memory: its bytes go straight to a temporary file. Plain fields are
//! collected into the parameter bag and honor the same bracket notation as
//! URL-encoded forms.

use crate::error::Result;
use crate::form::{Parameters, insert_bracketed};
use crate::logging::{debug, warn};
use crate::upload::{UploadError, UploadedFile};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
const MAX_HEADER_LINE: usize = 8 * 1024;

/// Limits applied while decoding
#[derive(Debug, Clone)]
pub struct MultipartLimits {
    /// Larger file parts are recorded as `SizeExceeded` with no content
    pub max_file_size: Option<u64>,
    /// Directory for temp files; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    /// Longest run of bytes read without a line break
    pub chunk_size: usize,
}

impl Default for MultipartLimits {
    fn default() -> Self {
        Self {
            max_file_size: None,
            temp_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Decoded fields and files
#[derive(Debug, Default)]
pub struct MultipartData {
    pub fields: Parameters,
    pub files: HashMap<String, UploadedFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitBoundary,
    ReadDisposition,
    ReadContentType,
    ReadData,
}

enum Line {
    Delimiter,
    Terminator,
    Content,
}

#[derive(Default)]
struct PartHeaders {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
}

impl PartHeaders {
    fn apply(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        let Some((key, value)) = line.split_once(':') else {
            return;
        };

        match key.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                for attr in split_unquoted(value, ';').into_iter().skip(1) {
                    let Some((attr_key, attr_value)) = attr.split_once('=') else {
                        continue;
                    };
                    let attr_value = unquote(attr_value).to_string();
                    match attr_key.trim().to_ascii_lowercase().as_str() {
                        "name" => self.name = attr_value,
                        "filename" => self.filename = Some(attr_value),
                        _ => {}
                    }
                }
            }
            "content-type" => self.content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    fn is_file(&self) -> bool {
        self.filename.is_some() || self.content_type.is_some()
    }
}

struct FilePart {
    name: String,
    filename: String,
    mime_type: String,
    file: Option<NamedTempFile>,
    size: u64,
    error: UploadError,
}

impl FilePart {
    fn write(&mut self, bytes: &[u8], max_file_size: Option<u64>) {
        if bytes.is_empty() || self.error != UploadError::Ok {
            return;
        }

        self.size += bytes.len() as u64;
        if max_file_size.is_some_and(|max| self.size > max) {
            self.error = UploadError::SizeExceeded;
            self.file = None;
            return;
        }

        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.write_all(bytes) {
                warn!(field = %self.name, error = %e, "Failed to write upload");
                self.error = UploadError::CantWrite;
                self.file = None;
            }
        }
    }

    fn finish(self) -> UploadedFile {
        let FilePart {
            filename,
            mime_type,
            file,
            size,
            error,
            ..
        } = self;

        match (error, file) {
            (UploadError::Ok, _) if size == 0 && filename.is_empty() => {
                UploadedFile::failed(filename, mime_type, UploadError::NoFile)
            }
            (UploadError::Ok, Some(mut file)) => match file.flush() {
                Ok(()) => UploadedFile::temporary(filename, mime_type, size, file.into_temp_path()),
                Err(_) => UploadedFile::failed(filename, mime_type, UploadError::CantWrite),
            },
            (UploadError::Ok, None) => {
                UploadedFile::failed(filename, mime_type, UploadError::CantWrite)
            }
            (error, _) => UploadedFile::failed(filename, mime_type, error),
        }
    }
}

enum Part {
    Skip,
    Field { name: String, value: Vec<u8> },
    File(FilePart),
}

/// Multipart form data parser
#[derive(Debug, Clone)]
pub struct MultipartParser {
    boundary: String,
    limits: MultipartLimits,
}

impl MultipartParser {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            limits: MultipartLimits::default(),
        }
    }

    /// Build a parser from a Content-Type header value.
    ///
    /// Returns `None` when the header carries no (or an empty) boundary.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        boundary_from_content_type(content_type).map(Self::new)
    }

    pub fn with_limits(mut self, limits: MultipartLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Decode a whole body.
    ///
    /// Parts that are still open when the input ends are discarded. An I/O
    /// error drops everything decoded so far (removing temp files) and is
    /// returned.
    pub fn parse<R: BufRead>(&self, mut reader: R) -> Result<MultipartData> {
        let mut data = MultipartData::default();
        if self.boundary.is_empty() {
            return Ok(data);
        }

        let delimiter = format!("--{}", self.boundary).into_bytes();
        let terminator = [delimiter.as_slice(), b"--"].concat();
        let chunk_size = self.limits.chunk_size.max(delimiter.len() + 4);

        let mut state = State::AwaitBoundary;
        let mut headers = PartHeaders::default();
        let mut part = Part::Skip;
        // Line break held back until we know a boundary does not follow it
        let mut pending: Vec<u8> = Vec::with_capacity(2);
        let mut chunk = Vec::with_capacity(chunk_size);
        let mut header_line = Vec::new();
        let mut at_line_start = true;

        loop {
            chunk.clear();
            if read_chunk(&mut reader, &mut chunk, chunk_size)? == 0 {
                break;
            }
            let line_start = at_line_start;
            at_line_start = chunk.ends_with(b"\n");

            match classify(&chunk, line_start, &delimiter, &terminator) {
                Line::Terminator => {
                    if state == State::ReadData {
                        self.flush_part(std::mem::replace(&mut part, Part::Skip), &mut data);
                    }
                    return Ok(data);
                }
                Line::Delimiter => {
                    if state == State::ReadData {
                        self.flush_part(std::mem::replace(&mut part, Part::Skip), &mut data);
                    }
                    pending.clear();
                    header_line.clear();
                    headers = PartHeaders::default();
                    state = State::ReadDisposition;
                    continue;
                }
                Line::Content => {}
            }

            match state {
                State::AwaitBoundary => {}
                State::ReadDisposition | State::ReadContentType => {
                    if header_line.len() < MAX_HEADER_LINE {
                        header_line.extend_from_slice(&chunk);
                    }
                    if !at_line_start {
                        continue;
                    }

                    let line = &header_line[..header_line.len() - line_break_len(&header_line)];
                    if line.trim_ascii().is_empty() {
                        part = self.begin_part(std::mem::take(&mut headers));
                        state = State::ReadData;
                    } else {
                        headers.apply(line);
                        state = State::ReadContentType;
                    }
                    header_line.clear();
                }
                State::ReadData => {
                    if pending == b"\r" && chunk == b"\n" {
                        pending.push(b'\n');
                        continue;
                    }

                    let mut body_len = chunk.len() - line_break_len(&chunk);
                    // A chunk cut at the cap may end inside a CRLF
                    if !at_line_start && chunk.ends_with(b"\r") {
                        body_len -= 1;
                    }
                    self.write_part(&mut part, &pending);
                    pending.clear();
                    self.write_part(&mut part, &chunk[..body_len]);
                    pending.extend_from_slice(&chunk[body_len..]);
                }
            }
        }

        if state == State::ReadData {
            debug!(boundary = %self.boundary, "Multipart body ended inside a part, discarding it");
        }
        Ok(data)
    }

    fn begin_part(&self, headers: PartHeaders) -> Part {
        if headers.name.is_empty() {
            debug!("Skipping multipart part without a field name");
            return Part::Skip;
        }

        if !headers.is_file() {
            return Part::Field {
                name: headers.name,
                value: Vec::new(),
            };
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("praetor-upload-");
        let created = match &self.limits.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };

        let (file, error) = match created {
            Ok(file) => (Some(file), UploadError::Ok),
            Err(e) => {
                warn!(field = %headers.name, error = %e, "Failed to create upload temp file");
                (None, UploadError::CantWrite)
            }
        };

        Part::File(FilePart {
            name: headers.name,
            filename: headers.filename.unwrap_or_default(),
            mime_type: headers
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            file,
            size: 0,
            error,
        })
    }

    fn write_part(&self, part: &mut Part, bytes: &[u8]) {
        match part {
            Part::Skip => {}
            Part::Field { value, .. } => value.extend_from_slice(bytes),
            Part::File(file) => file.write(bytes, self.limits.max_file_size),
        }
    }

    fn flush_part(&self, part: Part, data: &mut MultipartData) {
        match part {
            Part::Skip => {}
            Part::Field { name, value } => {
                let value = String::from_utf8_lossy(&value).into_owned();
                insert_bracketed(&mut data.fields, &name, Value::String(value));
            }
            Part::File(file) => {
                let name = file.name.clone();
                let upload = file.finish();
                debug!(
                    field = %name,
                    size = upload.size_bytes,
                    code = upload.error_code.code(),
                    "Received upload"
                );
                data.files.insert(name, upload);
            }
        }
    }
}

/// Extract the `boundary` parameter of a multipart Content-Type
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Split on `separator` outside double quotes
fn split_unquoted(value: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
        } else if quoted && c == '\\' {
            escaped = true;
        } else if c == '"' {
            quoted = !quoted;
        } else if c == separator && !quoted {
            parts.push(&value[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&value[start..]);
    parts
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn classify(chunk: &[u8], at_line_start: bool, delimiter: &[u8], terminator: &[u8]) -> Line {
    if !at_line_start {
        return Line::Content;
    }

    let line = chunk[..chunk.len() - line_break_len(chunk)].trim_ascii_end();
    if line == terminator {
        Line::Terminator
    } else if line == delimiter {
        Line::Delimiter
    } else {
        Line::Content
    }
}

fn line_break_len(chunk: &[u8]) -> usize {
    if chunk.ends_with(b"\r\n") {
        2
    } else if chunk.ends_with(b"\n") {
        1
    } else {
        0
    }
}

/// Read up to and including the next `\n`, at most `cap` bytes
fn read_chunk<R: BufRead>(reader: &mut R, out: &mut Vec<u8>, cap: usize) -> io::Result<usize> {
    while out.len() < cap {
        let available = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            break;
        }

        let window = &available[..available.len().min(cap - out.len())];
        match memchr::memchr(b'\n', window) {
            Some(i) => {
                out.extend_from_slice(&window[..=i]);
                reader.consume(i + 1);
                break;
            }
            None => {
                let n = window.len();
                out.extend_from_slice(window);
                reader.consume(n);
            }
        }
    }
    Ok(out.len())
}
