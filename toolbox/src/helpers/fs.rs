use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::errors::PathError;

pub fn read_text(path: &Path) -> Result<String, PathError> {
    std::fs::read_to_string(path).map_err(|source| PathError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Opens `output` for writing, or standard output when unset.
pub fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>, PathError> {
    match output {
        Some(path) => File::create(path)
            .map(|file| Box::new(file) as Box<dyn Write>)
            .map_err(|source| PathError::Write {
                path: path.display().to_string(),
                source,
            }),
        None => Ok(Box::new(std::io::stdout().lock())),
    }
}

pub fn write_output(output: Option<&Path>, content: &str) -> Result<(), PathError> {
    let target = output.map_or_else(|| "<stdout>".to_string(), |p| p.display().to_string());
    let mut writer = output_writer(output)?;
    writer
        .write_all(content.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|source| PathError::Write {
            path: target,
            source,
        })
}
