//! Reading the corpus artifacts from disk.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use encoding_rs::Encoding;
use ndarray::Array2;
use ndarray_npy::{ReadNpyError, ReadNpyExt};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Corpus, CorpusError, CorpusPaths, CorpusResult};
use crate::models::{EmbeddingConfig, Publication};

/// One CSV row as written by the offline pipeline. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct PublicationRow {
    #[serde(rename = "Title")]
    title: String,

    #[serde(rename = "Authors", default)]
    authors: Option<String>,

    #[serde(rename = "Year", default)]
    year: Option<String>,

    #[serde(rename = "Abstract")]
    abstract_text: String,
}

impl From<PublicationRow> for Publication {
    fn from(row: PublicationRow) -> Self {
        Publication::new(row.title, row.authors, row.year, row.abstract_text)
    }
}

/// Reads and validates the corpus artifacts at fixed paths.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    paths: CorpusPaths,
}

impl CorpusStore {
    pub fn new(paths: CorpusPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &CorpusPaths {
        &self.paths
    }

    /// Read both artifacts (and the stamp, if present) and validate them.
    ///
    /// Existence of both required files is checked before either is parsed,
    /// so a missing artifact is always reported as `NotFound`.
    pub fn load(&self) -> CorpusResult<Corpus> {
        for path in [&self.paths.publications, &self.paths.embeddings] {
            if !path.exists() {
                return Err(CorpusError::NotFound { path: path.clone() });
            }
        }

        let publications = read_publications(&self.paths.publications, &self.paths.encoding)?;
        let embeddings = read_embeddings(&self.paths.embeddings)?;
        let stamp = read_stamp(&self.paths.stamp)?;

        debug!(
            publications = publications.len(),
            rows = embeddings.nrows(),
            cols = embeddings.ncols(),
            stamped = stamp.is_some(),
            "Read corpus artifacts"
        );

        Corpus::new(publications, embeddings, stamp)
    }
}

/// Labels decoded as true ISO-8859-1 (every byte maps to the code point of
/// the same value). WHATWG maps these labels to windows-1252, which differs in
/// 0x80..=0x9F.
const ISO_8859_1_LABELS: &[&str] = &["latin-1", "latin1", "iso-8859-1", "iso8859-1", "l1"];

/// Decode table bytes with the encoding named by `label`. No BOM sniffing.
///
/// Returns the text and whether any byte sequence was malformed.
pub fn decode_table<'a>(bytes: &'a [u8], label: &str) -> CorpusResult<(Cow<'a, str>, bool)> {
    let normalized = label.trim().to_ascii_lowercase();
    if ISO_8859_1_LABELS.contains(&normalized.as_str()) {
        return Ok((Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()), false));
    }

    let encoding = Encoding::for_label(normalized.as_bytes())
        .ok_or_else(|| CorpusError::UnsupportedEncoding(label.to_string()))?;
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    Ok((text, had_errors))
}

/// Parse the publication table, decoding it from `encoding_label` first.
pub fn read_publications(path: &Path, encoding_label: &str) -> CorpusResult<Vec<Publication>> {
    let bytes = std::fs::read(path).map_err(|e| not_found_or_io(path, e))?;
    let (text, had_errors) = decode_table(&bytes, encoding_label)?;
    if had_errors {
        warn!(
            path = %path.display(),
            encoding = encoding_label,
            "Publication table contains undecodable bytes"
        );
    }

    parse_publications(text.as_bytes())
}

/// Parse already-decoded CSV content.
pub fn parse_publications(data: &[u8]) -> CorpusResult<Vec<Publication>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    for required in ["Title", "Abstract"] {
        if !headers.iter().any(|h| h == required) {
            return Err(CorpusError::Malformed(format!(
                "publication table has no '{}' column",
                required
            )));
        }
    }

    reader
        .deserialize::<PublicationRow>()
        .map(|row| row.map(Publication::from).map_err(CorpusError::from))
        .collect()
}

/// Read a 2-D `.npy` matrix, accepting `f32` or `f64` element types.
pub fn read_embeddings(path: &Path) -> CorpusResult<Array2<f32>> {
    let open = || -> CorpusResult<BufReader<File>> {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| not_found_or_io(path, e))
    };

    match Array2::<f32>::read_npy(open()?) {
        Ok(matrix) => Ok(matrix),
        Err(ReadNpyError::WrongDescriptor(_)) => {
            let wide = Array2::<f64>::read_npy(open()?).map_err(npy_error)?;
            debug!("Embedding matrix stored as f64, narrowing to f32");
            Ok(wide.mapv(|v| v as f32))
        }
        Err(e) => Err(npy_error(e)),
    }
}

/// Read the optional model identity stamp. A missing file is not an error.
pub fn read_stamp(path: &Path) -> CorpusResult<Option<EmbeddingConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| CorpusError::Malformed(format!("invalid stamp {}: {}", path.display(), e)))
}

fn npy_error(e: ReadNpyError) -> CorpusError {
    CorpusError::Npy(e.to_string())
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> CorpusError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CorpusError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        CorpusError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::DEFAULT_ENCODING;
    use crate::models::NOT_AVAILABLE;
    use ndarray::array;
    use ndarray_npy::write_npy;
    use std::path::PathBuf;

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: CorpusPaths,
    }

    fn fixture(csv_bytes: &[u8], matrix: Option<Array2<f32>>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusPaths {
            publications: dir.path().join("publications.csv"),
            embeddings: dir.path().join("embeddings.npy"),
            stamp: dir.path().join("embeddings.meta.json"),
            encoding: DEFAULT_ENCODING.to_string(),
        };
        std::fs::write(&paths.publications, csv_bytes).unwrap();
        if let Some(matrix) = matrix {
            write_npy(&paths.embeddings, &matrix).unwrap();
        }
        Fixture { _dir: dir, paths }
    }

    const TWO_ROWS: &[u8] = b"Title,Authors,Year,Abstract\n\
        Bone loss,\"Smith J, Doe A\",2014,Mice lost bone mass in orbit.\n\
        Plant roots,,,Roots grew in random directions.\n";

    #[test]
    fn test_load_valid_corpus() {
        let fx = fixture(TWO_ROWS, Some(array![[1.0, 0.0], [0.0, 1.0]]));
        let corpus = CorpusStore::new(fx.paths.clone()).load().unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.dimension(), 2);
        let first = corpus.publication(0).unwrap();
        assert_eq!(first.title, "Bone loss");
        assert_eq!(first.authors, "Smith J, Doe A");
        assert_eq!(first.year, "2014");
        let second = corpus.publication(1).unwrap();
        assert_eq!(second.authors, NOT_AVAILABLE);
        assert_eq!(second.year, NOT_AVAILABLE);
        assert!(corpus.stamp().is_none());
    }

    #[test]
    fn test_missing_optional_columns_default() {
        let csv = b"Title,Abstract\nOnly title,Some abstract\n";
        let fx = fixture(csv, Some(array![[1.0, 2.0]]));
        let corpus = CorpusStore::new(fx.paths.clone()).load().unwrap();
        let paper = corpus.publication(0).unwrap();
        assert_eq!(paper.authors, NOT_AVAILABLE);
        assert_eq!(paper.year, NOT_AVAILABLE);
    }

    #[test]
    fn test_row_count_mismatch_is_integrity_error() {
        let fx = fixture(TWO_ROWS, Some(array![[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]]));
        let err = CorpusStore::new(fx.paths.clone()).load().unwrap_err();
        assert!(matches!(
            err,
            CorpusError::Integrity {
                publications: 2,
                embeddings: 3
            }
        ));
    }

    #[test]
    fn test_missing_embeddings_is_not_found() {
        let fx = fixture(TWO_ROWS, None);
        let err = CorpusStore::new(fx.paths.clone()).load().unwrap_err();
        match err {
            CorpusError::NotFound { path } => assert_eq!(path, fx.paths.embeddings),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_table_is_not_found() {
        let mut fx = fixture(TWO_ROWS, Some(array![[1.0], [2.0]]));
        fx.paths.publications = PathBuf::from("/nonexistent/publications.csv");
        let err = CorpusStore::new(fx.paths.clone()).load().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_missing_required_column() {
        let csv = b"Title,Authors\nA,B\n";
        let fx = fixture(csv, Some(array![[1.0]]));
        let err = CorpusStore::new(fx.paths.clone()).load().unwrap_err();
        assert!(matches!(err, CorpusError::Malformed(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_latin1_decoding() {
        // "Müller" and "café" encoded as ISO-8859-1
        let csv: &[u8] = b"Title,Authors,Year,Abstract\nCaf\xe9 study,M\xfcller K,2020,Text\n";
        let fx = fixture(csv, Some(array![[1.0]]));
        let corpus = CorpusStore::new(fx.paths.clone()).load().unwrap();
        let paper = corpus.publication(0).unwrap();
        assert_eq!(paper.title, "Café study");
        assert_eq!(paper.authors, "Müller K");
    }

    #[test]
    fn test_latin1_is_exact_iso_8859_1() {
        let (text, had_errors) = decode_table(b"it\x92s \xe9", "latin-1").unwrap();
        assert_eq!(text, "it\u{92}s \u{e9}");
        assert!(!had_errors);

        let (text, _) = decode_table(b"it\x92s", "windows-1252").unwrap();
        assert_eq!(text, "it\u{2019}s");
    }

    #[test]
    fn test_bom_is_not_sniffed() {
        // A UTF-8 BOM must not switch a windows-1252 table to UTF-8.
        let (text, _) = decode_table(b"\xef\xbb\xbfA", "windows-1252").unwrap();
        assert_eq!(text, "\u{ef}\u{bb}\u{bf}A");
    }

    #[test]
    fn test_padded_headers_are_accepted() {
        let csv = b" Title , Authors ,Year, Abstract\nBone loss,Smith J,2014,Text\n";
        let papers = parse_publications(csv).unwrap();
        assert_eq!(papers[0].title, "Bone loss");
        assert_eq!(papers[0].authors, "Smith J");
        assert_eq!(papers[0].abstract_text, "Text");
    }

    #[test]
    fn test_unknown_encoding_label() {
        let mut fx = fixture(TWO_ROWS, Some(array![[1.0], [2.0]]));
        fx.paths.encoding = "klingon".to_string();
        let err = CorpusStore::new(fx.paths.clone()).load().unwrap_err();
        assert!(matches!(err, CorpusError::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_f64_matrix_is_narrowed() {
        let fx = fixture(TWO_ROWS, None);
        let wide: Array2<f64> = array![[0.25, 0.5], [1.0, -1.0]];
        write_npy(&fx.paths.embeddings, &wide).unwrap();
        let corpus = CorpusStore::new(fx.paths.clone()).load().unwrap();
        assert_eq!(corpus.embedding(0).unwrap().to_vec(), vec![0.25f32, 0.5]);
    }

    #[test]
    fn test_garbage_npy_is_npy_error() {
        let fx = fixture(TWO_ROWS, None);
        std::fs::write(&fx.paths.embeddings, b"not an npy file").unwrap();
        let err = CorpusStore::new(fx.paths.clone()).load().unwrap_err();
        assert!(matches!(err, CorpusError::Npy(_)));
    }

    #[test]
    fn test_stamp_is_read() {
        let fx = fixture(TWO_ROWS, Some(array![[1.0, 0.0], [0.0, 1.0]]));
        std::fs::write(
            &fx.paths.stamp,
            r#"{"model_name": "sentence-transformers/all-MiniLM-L6-v2", "dimension": 2}"#,
        )
        .unwrap();
        let corpus = CorpusStore::new(fx.paths.clone()).load().unwrap();
        assert_eq!(
            corpus.stamp().map(|s| s.model_name.as_str()),
            Some("sentence-transformers/all-MiniLM-L6-v2")
        );
    }

    #[test]
    fn test_invalid_stamp_is_malformed() {
        let fx = fixture(TWO_ROWS, Some(array![[1.0, 0.0], [0.0, 1.0]]));
        std::fs::write(&fx.paths.stamp, "{ not json").unwrap();
        let err = CorpusStore::new(fx.paths.clone()).load().unwrap_err();
        assert!(matches!(err, CorpusError::Malformed(_)));
    }
}
