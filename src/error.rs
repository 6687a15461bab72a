pub type ReelResult<T> = Result<T, ReelError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("sequence detection error: {0}")]
    Detection(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("frame read error: {0}")]
    Read(String),

    #[error("color space error: {0}")]
    ColorSpace(String),

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("conversion cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    pub fn color_space(msg: impl Into<String>) -> Self {
        Self::ColorSpace(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Per-frame errors are recoverable: the pipeline logs them and yields a
    /// missing frame. Everything else aborts the job.
    pub fn is_frame_recoverable(&self) -> bool {
        matches!(self, Self::Read(_) | Self::ColorSpace(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ReelError::detection("x")
                .to_string()
                .contains("sequence detection error:")
        );
        assert!(
            ReelError::config("x")
                .to_string()
                .contains("configuration error:")
        );
        assert!(ReelError::read("x").to_string().contains("frame read error:"));
        assert!(
            ReelError::encode("x")
                .to_string()
                .contains("encoding error:")
        );
    }

    #[test]
    fn recoverability_split() {
        assert!(ReelError::read("x").is_frame_recoverable());
        assert!(ReelError::color_space("x").is_frame_recoverable());
        assert!(!ReelError::encode("x").is_frame_recoverable());
        assert!(!ReelError::config("x").is_frame_recoverable());
        assert!(!ReelError::Cancelled.is_frame_recoverable());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReelError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
