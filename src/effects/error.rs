use std::path::PathBuf;

/// Why an effect file could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("effect file does not exist")]
    MissingFile,
    /// The document failed validation; every violation is listed.
    #[error("effect file is invalid: {}", .violations.join("; "))]
    BadData { violations: Vec<String> },
    /// Written by a newer release. Never guessed at.
    #[error("effect file uses save format {found}, newest supported is {supported}")]
    NewerFormatUnsupported { found: u64, supported: u32 },
}

impl LoadError {
    pub(crate) fn bad(violation: impl Into<String>) -> Self {
        Self::BadData {
            violations: vec![violation.into()],
        }
    }
}

/// Failure of a mutating effect file operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Load(#[from] LoadError),
    #[error("script {} is missing", .0.display())]
    ScriptMissing(PathBuf),
    #[error("no effect at {}", .0.display())]
    NoSuchEffect(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode effect: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }
}
