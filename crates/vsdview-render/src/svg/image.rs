//! Foreign data (embedded bitmaps and metafiles) to `<image>` elements.

use std::fmt::Write as _;
use std::path::Path;

use base64::Engine as _;
use vsdview_core::model::{ForeignData, ForeignSource};
use vsdview_core::{MediaStore, Shape};

use crate::Result;
use crate::diagnostics::{DiagnosticKind, RenderDiagnostics};
use crate::util::{escape_xml, fmt3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Emf,
    Wmf,
}

impl ImageFormat {
    /// Identifies a payload by its magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(Self::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        if bytes.starts_with(b"BM") {
            return Some(Self::Bmp);
        }
        if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            return Some(Self::Tiff);
        }
        if bytes.starts_with(&[0x01, 0x00, 0x00, 0x00]) && bytes.get(40..44) == Some(b" EMF") {
            return Some(Self::Emf);
        }
        if bytes.starts_with(&[0xD7, 0xCD, 0xC6, 0x9A])
            || bytes.starts_with(&[0x01, 0x00, 0x09, 0x00])
            || bytes.starts_with(&[0x02, 0x00, 0x09, 0x00])
        {
            return Some(Self::Wmf);
        }
        None
    }

    /// Fallback from the `ForeignType`/`CompressionType` attributes.
    fn from_hint(data: &ForeignData) -> Option<Self> {
        match data.foreign_type.as_str() {
            "EnhMetaFile" => return Some(Self::Emf),
            "MetaFile" => return Some(Self::Wmf),
            _ => {}
        }
        match data.compression.as_deref()?.to_ascii_uppercase().as_str() {
            "PNG" => Some(Self::Png),
            "JPEG" | "JPG" => Some(Self::Jpeg),
            "GIF" => Some(Self::Gif),
            "TIFF" => Some(Self::Tiff),
            "BMP" | "DIB" => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn is_metafile(self) -> bool {
        matches!(self, Self::Emf | Self::Wmf)
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Emf => "image/emf",
            Self::Wmf => "image/wmf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Emf => "emf",
            Self::Wmf => "wmf",
        }
    }

    fn accepts_extension(self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        match self {
            Self::Jpeg => matches!(ext.as_str(), "jpg" | "jpeg" | "jpe"),
            Self::Tiff => matches!(ext.as_str(), "tif" | "tiff"),
            Self::Bmp => matches!(ext.as_str(), "bmp" | "dib"),
            _ => ext == self.extension(),
        }
    }
}

/// File name for an extracted payload: the source part's stem, with an extension that agrees with
/// the detected format.
fn media_file_name(source_part: Option<&str>, format: ImageFormat, fallback_stem: &str) -> String {
    let file = source_part
        .and_then(|p| p.rsplit('/').next())
        .filter(|n| !n.is_empty());
    let Some(file) = file else {
        return format!("{fallback_stem}.{}", format.extension());
    };
    match file.rsplit_once('.') {
        Some((_, ext)) if format.accepts_extension(ext) => file.to_string(),
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.{}", format.extension()),
        _ => format!("{file}.{}", format.extension()),
    }
}

/// Image box inside the shape's pixel frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ImageBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ImageBox {
    pub(crate) fn of_shape(shape: &Shape, px_per_inch: f64) -> Self {
        let (w, h) = (shape.width(), shape.height());
        let cells = &shape.cells;
        let img_w = cells.f64("ImgWidth").filter(|v| *v > 0.0).unwrap_or(w);
        let img_h = cells.f64("ImgHeight").filter(|v| *v > 0.0).unwrap_or(h);
        let off_x = cells.f64_or("ImgOffsetX", 0.0);
        let off_y = cells.f64_or("ImgOffsetY", 0.0);
        Self {
            x: off_x * px_per_inch,
            y: (h - off_y - img_h) * px_per_inch,
            width: img_w * px_per_inch,
            height: img_h * px_per_inch,
        }
    }
}

fn payload<'a>(data: &'a ForeignData, media: &'a MediaStore) -> Option<(&'a [u8], Option<&'a str>)> {
    match &data.source {
        ForeignSource::Inline { data } => Some((data.as_slice(), None)),
        ForeignSource::Relationship { target, .. } => {
            let target = target.as_deref()?;
            Some((media.get(target)?, Some(target)))
        }
    }
}

/// Writes the shape's foreign data as an `<image>` (or a metafile placeholder). Missing or
/// unrecognised payloads are reported and draw nothing.
#[allow(clippy::too_many_arguments)]
pub(crate) fn write_foreign_image(
    out: &mut String,
    shape: &Shape,
    media: &MediaStore,
    media_dir: Option<&Path>,
    file_prefix: &str,
    px_per_inch: f64,
    diagnostics: &mut RenderDiagnostics,
) -> Result<()> {
    let Some(data) = shape.foreign_data.as_ref() else {
        return Ok(());
    };
    let Some((bytes, source_part)) = payload(data, media) else {
        diagnostics.push(
            Some(shape.id),
            DiagnosticKind::MissingMedia,
            format!("{} payload not found", data.foreign_type),
        );
        return Ok(());
    };
    let Some(format) = ImageFormat::sniff(bytes).or_else(|| ImageFormat::from_hint(data)) else {
        diagnostics.push(
            Some(shape.id),
            DiagnosticKind::MissingMedia,
            format!("{} payload is not a known image format", data.foreign_type),
        );
        return Ok(());
    };

    let bx = ImageBox::of_shape(shape, px_per_inch);
    if format.is_metafile() {
        diagnostics.push(
            Some(shape.id),
            DiagnosticKind::MetafilePlaceholder,
            format!("{} drawn as a placeholder", format.extension().to_ascii_uppercase()),
        );
        let _ = write!(
            out,
            r##"<g class="metafile-placeholder"><rect x="{x}" y="{y}" width="{w}" height="{h}" fill="#F2F2F2" stroke="#999999" stroke-dasharray="4 2"/><text x="{cx}" y="{cy}" font-size="10" fill="#666666" text-anchor="middle">{label}</text></g>"##,
            x = fmt3(bx.x),
            y = fmt3(bx.y),
            w = fmt3(bx.width),
            h = fmt3(bx.height),
            cx = fmt3(bx.x + bx.width / 2.0),
            cy = fmt3(bx.y + bx.height / 2.0),
            label = format.extension().to_ascii_uppercase(),
        );
        return Ok(());
    }

    let href = match media_dir {
        Some(dir) => {
            let name = media_file_name(source_part, format, &format!("{file_prefix}-shape{}", shape.id));
            std::fs::create_dir_all(dir)?;
            let path = dir.join(&name);
            std::fs::write(&path, bytes)?;
            tracing::debug!(shape = shape.id, path = %path.display(), "media written");
            path.to_string_lossy().into_owned()
        }
        None => format!(
            "data:{};base64,{}",
            format.mime(),
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
    };

    let _ = write!(
        out,
        r#"<image x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="none" href="{}"/>"#,
        fmt3(bx.x),
        fmt3(bx.y),
        fmt3(bx.width),
        fmt3(bx.height),
        escape_xml(&href)
    );
    Ok(())
}
