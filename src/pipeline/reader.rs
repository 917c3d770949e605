use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use serde_json::Value;
use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use crate::normalization::RawRecord;

const READ_BUFFER_BYTES: usize = 256 * 1024;

/// Open `path` for a fresh pass of decoded records.
///
/// Files ending in `.gz` are decompressed transparently (multi-member gzip is
/// supported). Every call reopens the file, so the sequence can be replayed.
pub fn read_records(path: impl AsRef<Path>) -> Result<JsonlRecords> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let inner: Box<dyn Read + Send> = if is_gzip_path(path) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(JsonlRecords {
        reader: BufReader::with_capacity(READ_BUFFER_BYTES, inner),
        path: path.to_path_buf(),
        line: Vec::new(),
        line_no: 0,
        done: false,
    })
}

fn is_gzip_path(path: &Path) -> bool {
    path.to_string_lossy().to_ascii_lowercase().ends_with(".gz")
}

/// Lazy iterator over the JSON objects of a line-delimited file.
///
/// Blank lines and lines that do not parse to a JSON object are skipped
/// without being counted. A read failure is yielded once, then the iterator
/// is exhausted. The file handle is released when the iterator is dropped.
pub struct JsonlRecords {
    reader: BufReader<Box<dyn Read + Send>>,
    path: PathBuf,
    line: Vec<u8>,
    line_no: u64,
    done: bool,
}

impl Iterator for JsonlRecords {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line_no += 1;
                    let text = decode_dropping_invalid(&self.line);
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
                        return Some(Ok(map));
                    }
                }
                Err(err) => {
                    self.done = true;
                    let ctx = format!("read line {} in {}", self.line_no + 1, self.path.display());
                    return Some(Err(anyhow::Error::new(err).context(ctx)));
                }
            }
        }
        None
    }
}

/// UTF-8 decode that drops invalid byte sequences instead of replacing them.
fn decode_dropping_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(err) => {
                let (valid, tail) = rest.split_at(err.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = err.error_len().unwrap_or(tail.len());
                rest = &tail[skip..];
            }
        }
    }
}
