// Hostname ingestion from CSV input

use std::io::{BufRead, Lines};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("error reading input in row {row}: {source}")]
    Io {
        row: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("empty record in row {row}")]
    EmptyRecord { row: usize },

    #[error("unterminated quoted field in row {row}")]
    UnterminatedQuote { row: usize },

    #[error("malformed record in row {row}: {reason}")]
    Malformed { row: usize, reason: &'static str },

    #[error("wrong number of fields in row {row}: expected {expected}, found {found}")]
    FieldCount {
        row: usize,
        expected: usize,
        found: usize,
    },
}

impl InputError {
    pub fn row(&self) -> usize {
        match self {
            InputError::Io { row, .. }
            | InputError::EmptyRecord { row }
            | InputError::UnterminatedQuote { row }
            | InputError::Malformed { row, .. }
            | InputError::FieldCount { row, .. } => *row,
        }
    }
}

/// Streams hostnames out of CSV input, one per record.
///
/// The first field of each record is the hostname, with surrounding
/// whitespace trimmed. Quoted fields may span lines and use `""` for a
/// literal quote. Every record must have as many fields as the first one.
///
/// Blank lines are skipped. Rows are numbered from 1 and count every line,
/// so an error row is the line in the source file where the bad record
/// starts.
pub struct HostnameReader<R> {
    lines: Lines<R>,
    line: usize,
    fields_per_record: Option<usize>,
}

impl<R: BufRead> HostnameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            fields_per_record: None,
        }
    }

    /// Pull the next physical line. `None` at end of input.
    fn next_line(&mut self) -> Option<Result<String, InputError>> {
        self.line += 1;
        let row = self.line;
        Some(
            self.lines
                .next()?
                .map_err(|source| InputError::Io { row, source }),
        )
    }

    /// Read one record as `(row, fields)`, skipping blank lines.
    fn read_record(&mut self) -> Option<Result<(usize, Vec<String>), InputError>> {
        let mut line = loop {
            match self.next_line()? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => break line,
                Err(e) => return Some(Err(e)),
            }
        };
        let row = self.line;

        let mut fields = Vec::new();
        let mut pos = 0;
        loop {
            if line[pos..].starts_with('"') {
                let mut field = String::new();
                let mut i = pos + 1;
                // Scan for the closing quote, pulling in more lines while open
                loop {
                    match line[i..].find('"') {
                        Some(offset) => {
                            field.push_str(&line[i..i + offset]);
                            i += offset + 1;
                            if line[i..].starts_with('"') {
                                field.push('"');
                                i += 1;
                            } else {
                                break;
                            }
                        }
                        None => {
                            field.push_str(&line[i..]);
                            field.push('\n');
                            line = match self.next_line() {
                                None => return Some(Err(InputError::UnterminatedQuote { row })),
                                Some(Ok(next)) => next,
                                Some(Err(e)) => return Some(Err(e)),
                            };
                            i = 0;
                        }
                    }
                }
                fields.push(field);

                if i == line.len() {
                    break;
                }
                if !line[i..].starts_with(',') {
                    return Some(Err(InputError::Malformed {
                        row,
                        reason: "extraneous text after closing quote",
                    }));
                }
                pos = i + 1;
            } else {
                let end = line[pos..].find(',').map_or(line.len(), |offset| pos + offset);
                let field = &line[pos..end];
                if field.contains('"') {
                    return Some(Err(InputError::Malformed {
                        row,
                        reason: "bare quote in unquoted field",
                    }));
                }
                fields.push(field.to_string());

                if end == line.len() {
                    break;
                }
                pos = end + 1;
            }
        }

        Some(Ok((row, fields)))
    }
}

impl<R: BufRead> Iterator for HostnameReader<R> {
    type Item = Result<String, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (row, fields) = match self.read_record()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };

        let expected = *self.fields_per_record.get_or_insert(fields.len());
        if fields.len() != expected {
            return Some(Err(InputError::FieldCount {
                row,
                expected,
                found: fields.len(),
            }));
        }

        let hostname = fields[0].trim();
        if hostname.is_empty() {
            return Some(Err(InputError::EmptyRecord { row }));
        }
        Some(Ok(hostname.to_string()))
    }
}

/// Read every hostname, stopping at the first bad record.
pub fn read_hostnames<R: BufRead>(reader: R) -> Result<Vec<String>, InputError> {
    HostnameReader::new(reader).collect()
}
