//! TSV staging file adapters for the copier
//!
//! Rows are tab separated with no header line and no quoting, the format the
//! database bulk load/unload commands produce and consume. A row holding one
//! empty field is an empty line.

use crate::copier::{CopyError, RecordSink, RecordSource};
use csv::StringRecord;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const TSV_DELIMITER: u8 = b'\t';

/// Reads TSV rows into reusable [`StringRecord`] buffers
pub struct TsvReader<R: Read> {
    inner: BufReader<R>,
    line: String,
}

impl<R: Read> TsvReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: String::new(),
        }
    }
}

impl TsvReader<File> {
    pub fn open(path: &Path) -> Result<Self, CopyError> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> RecordSource<StringRecord> for TsvReader<R> {
    fn read_into(&mut self, record: &mut StringRecord) -> Result<bool, CopyError> {
        self.line.clear();
        if self.inner.read_line(&mut self.line)? == 0 {
            return Ok(false);
        }
        let row = self.line.strip_suffix('\n').unwrap_or(&self.line);
        let row = row.strip_suffix('\r').unwrap_or(row);

        record.clear();
        for field in row.split(char::from(TSV_DELIMITER)) {
            record.push_field(field);
        }
        Ok(true)
    }
}

/// Writes [`StringRecord`] rows as TSV
pub struct TsvWriter<W: Write + Send> {
    inner: W,
}

impl<W: Write + Send> TsvWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W, CopyError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl TsvWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, CopyError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write + Send> RecordSink<StringRecord> for TsvWriter<W> {
    fn write(&mut self, record: &StringRecord) -> Result<(), CopyError> {
        for (i, field) in record.iter().enumerate() {
            if i > 0 {
                self.inner.write_all(&[TSV_DELIMITER])?;
            }
            self.inner.write_all(field.as_bytes())?;
        }
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CopyError> {
        Ok(self.inner.flush()?)
    }
}

/// A pool of `size` empty records for [`crate::copier::copy`]
pub fn record_pool(size: usize) -> Vec<StringRecord> {
    (0..size).map(|_| StringRecord::new()).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::copier::copy;

    #[test]
    fn test_copy_tsv_in_memory() {
        let input = "1\tapple\t2024-01-01\n2\tbanana\t\\N\n3\t\"quoted\"\tx\n";
        let mut reader = TsvReader::new(input.as_bytes());
        let mut writer = TsvWriter::new(Vec::new());

        let count = copy(&mut reader, &mut writer, record_pool(2)).unwrap();
        assert_eq!(count, 3);

        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_copy_tsv_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("IMP_target1_JBF01_EXE01_ORDERS.tsv");
        let dst = dir.path().join("copy.tsv");
        let rows: String = (0..250).map(|i| format!("{i}\tname-{i}\n")).collect();
        std::fs::write(&src, &rows).unwrap();

        let mut reader = TsvReader::open(&src).unwrap();
        let mut writer = TsvWriter::create(&dst).unwrap();
        assert_eq!(copy(&mut reader, &mut writer, record_pool(3)).unwrap(), 250);
        drop(writer);

        assert_eq!(std::fs::read_to_string(&dst).unwrap(), rows);
    }

    #[test]
    fn test_single_empty_field_survives_copy() {
        let mut writer = TsvWriter::new(Vec::new());
        for row in [vec!["a"], vec![""], vec!["b"], vec!["", ""]] {
            writer.write(&StringRecord::from(row)).unwrap();
        }
        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(output, "a\n\nb\n\t\n");

        let mut reader = TsvReader::new(output.as_bytes());
        let mut record = StringRecord::new();
        let mut rows = Vec::new();
        while reader.read_into(&mut record).unwrap() {
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
        assert_eq!(rows, vec![vec!["a"], vec![""], vec!["b"], vec!["", ""]]);
    }

    #[test]
    fn test_crlf_rows() {
        let mut reader = TsvReader::new("1\tx\r\n2\ty".as_bytes());
        let mut record = StringRecord::new();
        assert!(reader.read_into(&mut record).unwrap());
        assert_eq!(&record[1], "x");
        assert!(reader.read_into(&mut record).unwrap());
        assert_eq!(&record[1], "y");
        assert!(!reader.read_into(&mut record).unwrap());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TsvReader::open(&dir.path().join("absent.tsv")).err().unwrap();
        assert!(matches!(err, CopyError::Io(_)));
    }
}
