use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::{FormatError, FqFilterError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One 4-line FASTQ unit.
///
/// The separator line is kept verbatim so that encoding a decoded record
/// reproduces the input bytes exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    name: String,
    seq: String,
    plus: String,
    qual: String,
}

impl FastqRecord {
    /// Builds a record from its four lines (without line terminators).
    pub fn new(
        name: String,
        seq: String,
        plus: String,
        qual: String,
    ) -> std::result::Result<Self, FormatError> {
        validate(&name, &seq, &plus, &qual)?;
        Ok(Self { name, seq, plus, qual })
    }

    /// Decodes one unit. Exactly four lines are required.
    pub fn decode(lines: &[&str]) -> std::result::Result<Self, FormatError> {
        match lines {
            [name, seq, plus, qual] => Self::new(
                (*name).to_string(),
                (*seq).to_string(),
                (*plus).to_string(),
                (*qual).to_string(),
            ),
            _ => Err(FormatError::WrongLineCount(lines.len())),
        }
    }

    fn from_lines(mut lines: Vec<String>) -> std::result::Result<Self, FormatError> {
        if lines.len() != 4 {
            return Err(FormatError::WrongLineCount(lines.len()));
        }
        let qual = lines.pop().unwrap_or_default();
        let plus = lines.pop().unwrap_or_default();
        let seq = lines.pop().unwrap_or_default();
        let name = lines.pop().unwrap_or_default();
        Self::new(name, seq, plus, qual)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seq(&self) -> &str {
        &self.seq
    }

    pub fn plus(&self) -> &str {
        &self.plus
    }

    pub fn qual(&self) -> &str {
        &self.qual
    }

    /// Number of bases.
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Writes the record as four `\n`-terminated lines.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(self.name.as_bytes())?;
        w.write_all(b"\n")?;
        w.write_all(self.seq.as_bytes())?;
        w.write_all(b"\n")?;
        w.write_all(self.plus.as_bytes())?;
        w.write_all(b"\n")?;
        w.write_all(self.qual.as_bytes())?;
        w.write_all(b"\n")?;
        Ok(())
    }

    /// Inverse of [`FastqRecord::decode`], as text.
    pub fn encode(&self) -> String {
        format!("{}\n{}\n{}\n{}\n", self.name, self.seq, self.plus, self.qual)
    }
}

fn validate(
    name: &str,
    seq: &str,
    plus: &str,
    qual: &str,
) -> std::result::Result<(), FormatError> {
    if !name.starts_with('@') {
        return Err(FormatError::MissingIdMarker);
    }
    if !plus.starts_with('+') {
        return Err(FormatError::MissingSeparator);
    }
    if seq.len() != qual.len() {
        return Err(FormatError::LengthMismatch { seq: seq.len(), qual: qual.len() });
    }
    Ok(())
}

fn trim_newline(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
    }
    if line.ends_with('\r') {
        line.pop();
    }
}

/// Sequential FASTQ reader over plain or gzip (including multi-member) input.
pub struct Reader {
    reader: Box<dyn BufRead>,
    path: PathBuf,
    line: u64,
    records: u64,
}

impl Reader {
    pub fn new(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| FqFilterError::io(path, e))?;
        let mut buffered = BufReader::new(f);
        let is_gzip = buffered
            .fill_buf()
            .map_err(|e| FqFilterError::io(path, e))?
            .starts_with(&GZIP_MAGIC);
        let reader: Box<dyn BufRead> = if is_gzip {
            Box::new(BufReader::new(MultiGzDecoder::new(buffered)))
        } else {
            Box::new(buffered)
        };
        Ok(Self::from_bufread(reader, path))
    }

    /// Wraps an already-decoded text stream; `label` is used in error messages.
    pub fn from_bufread(reader: Box<dyn BufRead>, label: impl Into<PathBuf>) -> Self {
        Self { reader, path: label.into(), line: 0, records: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records decoded so far.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Returns the next record, `Ok(None)` at end of input.
    ///
    /// Blank lines are tolerated only after the last record.
    pub fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        let mut lines: Vec<String> = Vec::with_capacity(4);
        let mut first_line = self.line + 1;
        let mut blank_at: Option<u64> = None;

        while lines.len() < 4 {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).map_err(|source| {
                let line = self.line + 1;
                FqFilterError::CorruptInput { path: self.path.clone(), line, source }
            })?;
            if n == 0 {
                break;
            }
            self.line += 1;
            trim_newline(&mut line);

            if lines.is_empty() {
                if line.is_empty() {
                    blank_at.get_or_insert(self.line);
                    continue;
                }
                if let Some(at) = blank_at.take() {
                    return Err(self.format_error(at, FormatError::MissingIdMarker));
                }
                first_line = self.line;
            }
            lines.push(line);
        }

        if lines.is_empty() {
            return Ok(None);
        }

        match FastqRecord::from_lines(lines) {
            Ok(rec) => {
                self.records += 1;
                Ok(Some(rec))
            }
            Err(e) => Err(self.format_error(first_line, e)),
        }
    }

    fn format_error(&self, line: u64, source: FormatError) -> FqFilterError {
        FqFilterError::Format { path: self.path.clone(), line, record: self.records + 1, source }
    }
}

impl Iterator for Reader {
    type Item = Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

enum Sink {
    Gzip(GzEncoder<BufWriter<File>>),
    Plain(BufWriter<File>),
    Stream(Box<dyn Write + Send>),
}

/// FASTQ writer; gzip when the output path ends in `.gz`.
pub struct Writer {
    sink: Sink,
    path: PathBuf,
}

impl Writer {
    pub fn new(path: &Path, compression_level: u32) -> Result<Self> {
        let f = File::create(path).map_err(|e| FqFilterError::io(path, e))?;
        let buffered = BufWriter::new(f);
        let sink = if path.extension().is_some_and(|ext| ext == "gz") {
            Sink::Gzip(GzEncoder::new(buffered, Compression::new(compression_level)))
        } else {
            Sink::Plain(buffered)
        };
        Ok(Self { sink, path: path.to_path_buf() })
    }

    /// Writes uncompressed records to an arbitrary stream.
    pub fn from_writer(writer: Box<dyn Write + Send>, label: impl Into<PathBuf>) -> Self {
        Self { sink: Sink::Stream(writer), path: label.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_record(&mut self, rec: &FastqRecord) -> io::Result<()> {
        rec.write_to(self)
    }

    /// Flushes buffered data and, for gzip output, writes the trailer.
    pub fn finish(self) -> Result<()> {
        let path = self.path;
        let res = match self.sink {
            Sink::Gzip(enc) => enc.finish().and_then(|mut inner| inner.flush()),
            Sink::Plain(mut w) => w.flush(),
            Sink::Stream(mut w) => w.flush(),
        };
        res.map_err(|e| FqFilterError::io(path, e))
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Gzip(w) => w.write(buf),
            Sink::Plain(w) => w.write(buf),
            Sink::Stream(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Gzip(w) => w.flush(),
            Sink::Plain(w) => w.flush(),
            Sink::Stream(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn reader_over(text: &str) -> Reader {
        Reader::from_bufread(Box::new(Cursor::new(text.as_bytes().to_vec())), "test.fq")
    }

    #[test]
    fn test_decode_valid_record() {
        let rec = FastqRecord::decode(&["@r1 extra", "ACGTN", "+", "IIII#"]).unwrap();
        assert_eq!(rec.name(), "@r1 extra");
        assert_eq!(rec.seq(), "ACGTN");
        assert_eq!(rec.plus(), "+");
        assert_eq!(rec.qual(), "IIII#");
        assert_eq!(rec.len(), 5);
    }

    #[test]
    fn test_decode_rejects_wrong_line_count() {
        assert_eq!(
            FastqRecord::decode(&["@r1", "ACGT", "+"]),
            Err(FormatError::WrongLineCount(3))
        );
    }

    #[test]
    fn test_decode_rejects_missing_markers() {
        assert_eq!(
            FastqRecord::decode(&["r1", "ACGT", "+", "IIII"]),
            Err(FormatError::MissingIdMarker)
        );
        assert_eq!(
            FastqRecord::decode(&["@r1", "ACGT", "-", "IIII"]),
            Err(FormatError::MissingSeparator)
        );
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        assert_eq!(
            FastqRecord::decode(&["@r1", "ACGT", "+", "III"]),
            Err(FormatError::LengthMismatch { seq: 4, qual: 3 })
        );
    }

    #[test]
    fn test_decode_passes_unusual_bases_through() {
        let rec = FastqRecord::decode(&["@r1", "acgRY", "+r1", "IIIII"]).unwrap();
        assert_eq!(rec.seq(), "acgRY");
        assert_eq!(rec.encode(), "@r1\nacgRY\n+r1\nIIIII\n");
    }

    #[test]
    fn test_encode_is_inverse_of_decode() {
        let lines = ["@read/1", "GATTACA", "+read/1", "ABCDEFG"];
        let rec = FastqRecord::decode(&lines).unwrap();
        let text = rec.encode();
        let back: Vec<&str> = text.lines().collect();
        assert_eq!(back, lines);
        assert_eq!(FastqRecord::decode(&back).unwrap(), rec);
    }

    #[test]
    fn test_reader_reads_records_and_strips_crlf() {
        let mut r = reader_over("@a\r\nACGT\r\n+\r\nIIII\r\n@b\nTT\n+\nII\n");
        let a = r.next_record().unwrap().unwrap();
        assert_eq!(a.name(), "@a");
        assert_eq!(a.seq(), "ACGT");
        let b = r.next_record().unwrap().unwrap();
        assert_eq!(b.qual(), "II");
        assert!(r.next_record().unwrap().is_none());
        assert_eq!(r.records_read(), 2);
    }

    #[test]
    fn test_reader_ignores_trailing_blank_lines() {
        let recs: Vec<_> =
            reader_over("@a\nACGT\n+\nIIII\n\n\n").collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn test_reader_reports_truncated_record() {
        let mut r = reader_over("@a\nACGT\n+\nIIII\n@b\nACGT\n");
        assert!(r.next_record().unwrap().is_some());
        match r.next_record() {
            Err(FqFilterError::Format { line, record, source, .. }) => {
                assert_eq!(line, 5);
                assert_eq!(record, 2);
                assert_eq!(source, FormatError::WrongLineCount(2));
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_reader_rejects_blank_line_between_records() {
        let mut r = reader_over("@a\nACGT\n+\nIIII\n\n@b\nACGT\n+\nIIII\n");
        assert!(r.next_record().unwrap().is_some());
        match r.next_record() {
            Err(FqFilterError::Format { line, source, .. }) => {
                assert_eq!(line, 5);
                assert_eq!(source, FormatError::MissingIdMarker);
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_gzip_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fq.gz");
        let rec = FastqRecord::decode(&["@r1", "ACGT", "+", "IIII"]).unwrap();

        let mut w = Writer::new(&path, 4).unwrap();
        w.write_record(&rec).unwrap();
        w.finish().unwrap();

        let mut raw = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut raw).unwrap();
        assert!(raw.starts_with(&GZIP_MAGIC));

        let recs: Vec<_> = Reader::new(&path).unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(recs, vec![rec]);
    }

    #[test]
    fn test_plain_output_without_gz_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fq");
        let rec = FastqRecord::decode(&["@r1", "ACGT", "+", "IIII"]).unwrap();

        let mut w = Writer::new(&path, 4).unwrap();
        w.write_record(&rec).unwrap();
        w.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "@r1\nACGT\n+\nIIII\n");
    }

    #[test]
    fn test_reader_accepts_empty_sequence() {
        let rec = reader_over("@r1\n\n+\n\n").next_record().unwrap().unwrap();
        assert!(rec.is_empty());
        assert_eq!(rec.encode(), "@r1\n\n+\n\n");
    }

    #[test]
    fn test_reader_reports_invalid_utf8_with_line() {
        let bytes = b"@r\nAC\xffT\n+\nIIII\n".to_vec();
        let mut reader = Reader::from_bufread(Box::new(Cursor::new(bytes)), "bad.fq");
        match reader.next_record() {
            Err(FqFilterError::CorruptInput { path, line, .. }) => {
                assert_eq!(path, PathBuf::from("bad.fq"));
                assert_eq!(line, 2);
            }
            other => panic!("expected corrupt input, got {other:?}"),
        }
    }

    #[test]
    fn test_reader_reads_every_gzip_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.fq.gz");
        let mut bytes = Vec::new();
        for name in ["@a", "@b", "@c"] {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(format!("{name}\nACGT\n+\nIIII\n").as_bytes()).unwrap();
            bytes.extend(enc.finish().unwrap());
        }
        std::fs::write(&path, bytes).unwrap();

        let names: Vec<String> = Reader::new(&path)
            .unwrap()
            .map(|r| r.unwrap().name().to_string())
            .collect();
        assert_eq!(names, ["@a", "@b", "@c"]);
    }
}
