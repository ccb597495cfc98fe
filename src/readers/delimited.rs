//! Streaming record iterator over whitespace- or comma-delimited text files.
//!
//! Comma files go through the [`csv`] crate (quoting, trimming); whitespace files are
//! split on runs of blanks line by line, skipping empty lines. Both yield the header
//! once and then one `Vec<String>` per data row.
use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
};

use camino::{Utf8Path, Utf8PathBuf};

use crate::{readers::FieldSeparator, surveyjoin_errors::SurveyJoinError};

enum RecordIter {
    Whitespace(Lines<BufReader<File>>),
    Comma(csv::StringRecordsIntoIter<BufReader<File>>),
}

pub(crate) struct DelimitedReader {
    path: Utf8PathBuf,
    header: Vec<String>,
    records: RecordIter,
}

impl DelimitedReader {
    pub(crate) fn open(path: &Utf8Path, separator: FieldSeparator) -> Result<Self, SurveyJoinError> {
        let file = File::open(path).map_err(|e| {
            SurveyJoinError::malformed(path.as_str(), format!("cannot open file: {e}"))
        })?;
        let reader = BufReader::new(file);

        let (header, records) = match separator {
            FieldSeparator::Whitespace => {
                let mut lines = reader.lines();
                let mut header = None;
                for line in lines.by_ref() {
                    let line = line?;
                    if !line.trim().is_empty() {
                        header = Some(line.split_whitespace().map(str::to_string).collect());
                        break;
                    }
                }
                (header, RecordIter::Whitespace(lines))
            }
            FieldSeparator::Comma => {
                let mut csv_reader = csv::ReaderBuilder::new()
                    .has_headers(true)
                    .flexible(true)
                    .trim(csv::Trim::All)
                    .from_reader(reader);
                let header: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
                let header = (!header.is_empty()).then_some(header);
                (header, RecordIter::Comma(csv_reader.into_records()))
            }
        };

        let header = header.ok_or_else(|| {
            SurveyJoinError::malformed(path.as_str(), "empty file, no header line found")
        })?;

        Ok(DelimitedReader {
            path: path.to_path_buf(),
            header,
            records,
        })
    }

    pub(crate) fn header(&self) -> &[String] {
        &self.header
    }
}

impl Iterator for DelimitedReader {
    type Item = Result<Vec<String>, SurveyJoinError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.records {
            RecordIter::Whitespace(lines) => loop {
                match lines.next()? {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => {
                        return Some(Ok(line.split_whitespace().map(str::to_string).collect()))
                    }
                    Err(e) => {
                        return Some(Err(SurveyJoinError::malformed(
                            self.path.as_str(),
                            format!("cannot read line: {e}"),
                        )))
                    }
                }
            },
            RecordIter::Comma(records) => {
                let record = records.next()?;
                Some(
                    record
                        .map(|r| r.iter().map(str::to_string).collect())
                        .map_err(|e| {
                            SurveyJoinError::malformed(self.path.as_str(), format!("invalid record: {e}"))
                        }),
                )
            }
        }
    }
}
