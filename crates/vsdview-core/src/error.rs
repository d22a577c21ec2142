pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not a valid package container: {0}")]
    Package(#[from] zip::result::ZipError),

    #[error("Invalid Visio package: {message}")]
    InvalidPackage { message: String },

    #[error("Package part `{part}` is too large ({size} bytes; limit {max})")]
    PartTooLarge { part: String, size: u64, max: u64 },

    #[error("Package is too large ({total} bytes inflated; limit {max})")]
    PackageTooLarge { total: u64, max: u64 },

    #[error("Missing package part: {part}")]
    PartMissing { part: String },

    #[error("Malformed part {part}: {message}")]
    SchemaParse { part: String, message: String },

    #[error("Unsupported geometry row `{kind}` (IX={ix})")]
    UnsupportedGeometryOp { kind: String, ix: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn schema(part: &str, message: impl Into<String>) -> Self {
        Self::SchemaParse {
            part: part.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn missing(part: &str) -> Self {
        Self::PartMissing {
            part: part.to_string(),
        }
    }
}
