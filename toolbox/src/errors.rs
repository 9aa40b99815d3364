use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("File `{path}` could not be read: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("File `{path}` could not be written: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Invalid configuration file `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yml::Error,
    },
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("The dive log has no dive computers eligible for {0}")]
    NothingEligible(&'static str),
    #[error("Line {line}: invalid date `{value}`")]
    InvalidDate { line: usize, value: String },
    #[error("Nothing to correlate: pass a dive log, a GPS track or both")]
    NoSources,
}
