use std::path::Path;

use vsdview_core::{Document, ParseOptions};

use crate::{ConvertError, Result};

/// Package kind as implied by the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    /// `.vsdx`, `.vsdm`
    Drawing,
    /// `.vssx`, `.vssm`
    Stencil,
    /// `.vstx`, `.vstm`
    Template,
    /// `.vsd`, `.vss`, `.vst` (pre-2013 binary format).
    LegacyBinary,
}

impl PackageFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "vsdx" | "vsdm" => Some(Self::Drawing),
            "vssx" | "vssm" => Some(Self::Stencil),
            "vstx" | "vstm" => Some(Self::Template),
            "vsd" | "vss" | "vst" => Some(Self::LegacyBinary),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        Self::from_extension(path.extension()?.to_str()?)
    }

    /// ZIP+XML packages this crate reads itself.
    pub fn is_native(self) -> bool {
        !matches!(self, Self::LegacyBinary)
    }
}

/// Opens a package from disk.
///
/// Legacy binary files are refused with [`ConvertError::ConversionUnavailable`]. Unknown
/// extensions are attempted as ZIP+XML packages.
pub fn open_path(path: impl AsRef<Path>, options: &ParseOptions) -> Result<Document> {
    let path = path.as_ref();
    match PackageFormat::from_path(path) {
        Some(format) if !format.is_native() => {
            return Err(ConvertError::ConversionUnavailable {
                reason: format!(
                    "{} is a legacy binary Visio file; convert it to .vsdx first",
                    path.display()
                ),
            });
        }
        Some(format) => tracing::debug!(path = %path.display(), ?format, "opening package"),
        None => tracing::debug!(path = %path.display(), "unknown extension; trying as a package"),
    }
    let bytes = std::fs::read(path)?;
    open_bytes(&bytes, options)
}

pub fn open_bytes(bytes: &[u8], options: &ParseOptions) -> Result<Document> {
    let document = Document::from_bytes(bytes, options)?;
    if !document.report.is_clean() {
        tracing::debug!(issues = document.report.issues().len(), "package loaded with contained part failures");
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_map_to_formats() {
        assert_eq!(PackageFormat::from_extension("VSDX"), Some(PackageFormat::Drawing));
        assert_eq!(PackageFormat::from_extension(".vssm"), Some(PackageFormat::Stencil));
        assert_eq!(PackageFormat::from_extension("vstx"), Some(PackageFormat::Template));
        assert_eq!(PackageFormat::from_extension("vsd"), Some(PackageFormat::LegacyBinary));
        assert_eq!(PackageFormat::from_extension("png"), None);
        assert!(!PackageFormat::LegacyBinary.is_native());
    }

    #[test]
    fn legacy_files_are_refused_before_reading() {
        let err = open_path("/nonexistent/drawing.vsd", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::ConversionUnavailable { .. }));
    }
}
