use std::fmt;

/// Sub-kinds of I/O failure the core distinguishes, per the error taxonomy.
#[derive(Debug)]
pub enum IoErrorKind {
    ShortRead,
    ShortWrite,
    SeekOnCompressed,
    LockConflict,
    Other(std::io::Error),
}

impl fmt::Display for IoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoErrorKind::ShortRead => write!(f, "short read"),
            IoErrorKind::ShortWrite => write!(f, "short write"),
            IoErrorKind::SeekOnCompressed => write!(f, "seek attempted on a compressed stream"),
            IoErrorKind::LockConflict => write!(f, "file is locked by another writer"),
            IoErrorKind::Other(e) => write!(f, "{e}"),
        }
    }
}

/// The nine error kinds the core distinguishes.
#[derive(thiserror::Error, Debug)]
pub enum SdsError {
    #[error("{site}: dataset handle is uninitialized or disconnected")]
    BadDataset { site: &'static str },

    #[error("{site}: {message}")]
    BadField { site: &'static str, message: String },

    #[error("{site}: target '{target}' not found")]
    BadTarget { site: &'static str, target: String },

    #[error("{site}: cannot cast {from} to {to}")]
    TypeMismatch {
        site: &'static str,
        from: String,
        to: String,
    },

    #[error("{site}: {kind}")]
    Io {
        site: &'static str,
        kind: IoErrorKind,
    },

    #[error("{site}: codec failure: {message}")]
    CodecError { site: &'static str, message: String },

    #[error("{site}: allocation failure ({detail})")]
    Alloc { site: &'static str, detail: String },

    #[error("{site}: unsupported type {ty}")]
    UnsupportedType { site: &'static str, ty: String },

    #[error("{site}: {message}")]
    Protocol { site: &'static str, message: String },
}

impl SdsError {
    pub fn io(site: &'static str, kind: IoErrorKind) -> Self {
        SdsError::Io { site, kind }
    }

    pub fn protocol(site: &'static str, message: impl Into<String>) -> Self {
        SdsError::Protocol {
            site,
            message: message.into(),
        }
    }

    pub fn bad_field(site: &'static str, message: impl Into<String>) -> Self {
        SdsError::BadField {
            site,
            message: message.into(),
        }
    }

    pub fn bad_target(site: &'static str, target: impl Into<String>) -> Self {
        SdsError::BadTarget {
            site,
            target: target.into(),
        }
    }

    pub fn type_mismatch(site: &'static str, from: impl Into<String>, to: impl Into<String>) -> Self {
        SdsError::TypeMismatch {
            site,
            from: from.into(),
            to: to.into(),
        }
    }
}

impl From<std::io::Error> for SdsError {
    fn from(e: std::io::Error) -> Self {
        SdsError::Io {
            site: "stream",
            kind: IoErrorKind::Other(e),
        }
    }
}

pub type SdsResult<T> = Result<T, SdsError>;

/// Per-handle error chain.
#[derive(Debug, Default)]
pub struct ErrorChain {
    errors: Vec<SdsError>,
}

impl ErrorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: SdsError) {
        log::debug!("sds error appended: {error}");
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn last(&self) -> Option<&SdsError> {
        self.errors.last()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &SdsError> {
        self.errors.iter()
    }

    /// Renders the whole chain the way a top-level program would print it before exiting.
    pub fn render(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
