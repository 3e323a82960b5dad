use review_model::{FieldError, InvalidBoundingBox, RecordKey};
use std::io;
use std::path::PathBuf;

/// An input file is missing, malformed, or inconsistent with the PDF.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed JSON in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "{}: question {question} references page {page}, but the PDF has {page_count} pages",
        path.display()
    )]
    PageOutOfRange { path: PathBuf, question: u32, page: u32, page_count: u32 },
    #[error("{}: question {question} has an invalid bounding box: {source}", path.display())]
    InvalidBoundingBox {
        path: PathBuf,
        question: u32,
        #[source]
        source: InvalidBoundingBox,
    },
    #[error("question {question} has OCR text but no entry in {}", bbox_path.display())]
    MissingBoundingBox { bbox_path: PathBuf, question: u32 },
    #[error("{}: duplicate record for {key}", path.display())]
    DuplicateRecord { path: PathBuf, key: RecordKey },
    #[error("{}: no questions found", path.display())]
    NoQuestions { path: PathBuf },
}

/// A lookup named a record that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no record for {key}")]
pub struct NotFound {
    pub key: RecordKey,
}

/// Edited records that fail validation, each with its errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", describe_invalid(.records))]
pub struct InvalidRecords {
    pub records: Vec<(RecordKey, Vec<FieldError>)>,
}

fn describe_invalid(records: &[(RecordKey, Vec<FieldError>)]) -> String {
    records
        .iter()
        .map(|(key, errors)| {
            let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
            format!("{key}: {}", errors.join("; "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Saving failed. The previous file at `path`, if any, is untouched.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures reading or writing the per-user data directory.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Write(#[from] WriteError),
}
