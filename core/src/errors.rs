use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Error parsing markup: `{0}`")]
    Parse(#[from] xml::reader::Error),
    #[error("The document has no root element")]
    MissingRoot,
    #[error("Invalid {kind} document: unexpected root element `{found}`")]
    InvalidRoot { kind: &'static str, found: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeZoneError {
    #[error("Invalid time zone offset `{0}`")]
    Invalid(String),
    #[error("Time zone offset `{0}` is out of range")]
    OutOfRange(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("Invalid sample: missing or non-numeric key field")]
    InvalidKey,
}

#[derive(Error, Debug)]
pub enum DiveLogError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("Dive #{dive}: {source}")]
    TimeZone {
        dive: u32,
        #[source]
        source: TimeZoneError,
    },
    #[error("Invalid time zone: {0}")]
    InvalidTimeZone(#[from] TimeZoneError),
    #[error("Dive #{dive} has an invalid start date/time `{value}`")]
    InvalidStart { dive: u32, value: String },
    #[error("Dive index {0} is out of range")]
    UnknownDive(usize),
    #[error("Dive site `{0}` does not exist")]
    UnknownSite(String),
    #[error("Error loading dive samples: {0}")]
    Sample(#[from] SampleError),
}

#[derive(Error, Debug)]
pub enum TrackError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("Invalid track point timestamp `{0}`")]
    InvalidTime(String),
    #[error("Error loading track points: {0}")]
    Sample(#[from] SampleError),
    #[error("No tracks or waypoints to write")]
    NoContent,
}

#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error(transparent)]
    DiveLog(#[from] DiveLogError),
    #[error(transparent)]
    Track(#[from] TrackError),
}
