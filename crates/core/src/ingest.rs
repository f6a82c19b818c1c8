use crate::{Document, IngestError};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// A single file is returned as is; a directory is searched recursively for `.jsonl` files.
pub fn discover_record_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_jsonl = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"));

        if is_jsonl {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct SkippedLine {
    pub path: PathBuf,
    pub line: usize,
    pub reason: String,
}

pub struct SourceReport {
    pub documents: Vec<Document>,
    pub skipped_lines: Vec<SkippedLine>,
}

struct OpenFile {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: usize,
}

/// Streams records from every `.jsonl` file under a path, one line at a time.
///
/// Lines that are not valid records are skipped and kept for
/// [`DocumentReader::finish`]. An I/O failure ends the stream and is
/// returned from `finish`.
pub struct DocumentReader {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<OpenFile>,
    skipped_lines: Vec<SkippedLine>,
    failure: Option<IngestError>,
}

impl DocumentReader {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let files = discover_record_files(path);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no .jsonl record files found in {}",
                path.display()
            )));
        }

        Ok(Self {
            files: files.into_iter(),
            current: None,
            skipped_lines: Vec::new(),
            failure: None,
        })
    }

    pub fn skipped_lines(&self) -> &[SkippedLine] {
        &self.skipped_lines
    }

    pub fn finish(self) -> Result<Vec<SkippedLine>, IngestError> {
        match self.failure {
            Some(error) => Err(error),
            None => Ok(self.skipped_lines),
        }
    }

    fn next_line(&mut self) -> Result<Option<(PathBuf, usize, String)>, IngestError> {
        loop {
            if let Some(open) = self.current.as_mut() {
                if let Some(line) = open.lines.next() {
                    open.line += 1;
                    return Ok(Some((open.path.clone(), open.line, line?)));
                }
            }

            let Some(path) = self.files.next() else {
                self.current = None;
                return Ok(None);
            };
            let reader = BufReader::new(File::open(&path)?);
            self.current = Some(OpenFile {
                path,
                lines: reader.lines(),
                line: 0,
            });
        }
    }
}

impl Iterator for DocumentReader {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        if self.failure.is_some() {
            return None;
        }

        loop {
            let (path, line, text) = match self.next_line() {
                Ok(Some(next)) => next,
                Ok(None) => return None,
                Err(error) => {
                    self.failure = Some(error);
                    return None;
                }
            };
            if text.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<Document>(&text) {
                Ok(document) => return Some(document),
                Err(error) => {
                    warn!(path = %path.display(), line, %error, "skipping undecodable record");
                    self.skipped_lines.push(SkippedLine {
                        path,
                        line,
                        reason: error.to_string(),
                    });
                }
            }
        }
    }
}

/// Reads every record under `path` into memory.
pub fn read_documents(path: &Path) -> Result<SourceReport, IngestError> {
    let mut reader = DocumentReader::open(path)?;
    let documents = reader.by_ref().collect();
    Ok(SourceReport {
        documents,
        skipped_lines: reader.finish()?,
    })
}
