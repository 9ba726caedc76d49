use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    /// Config file missing/unreadable, YAML parse error, validation error,
    /// or a script var setup failure.
    Config(anyhow::Error),

    /// Report rendering or output I/O failure.
    Internal(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::Internal(_) => ExitCode::Fatal,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::Config(e) | Self::Internal(e) => e,
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) | Self::Internal(e) => write!(f, "{e:#}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}
