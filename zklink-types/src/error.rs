pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Record too short: expected {expected} bytes, got {actual}")]
    RecordTooShort { expected: usize, actual: usize },
}

impl Error {
    pub(crate) fn check_len(buf: &[u8], expected: usize) -> Result<()> {
        if buf.len() < expected {
            return Err(Error::RecordTooShort {
                expected,
                actual: buf.len(),
            });
        }
        Ok(())
    }
}
