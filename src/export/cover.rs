//! Cover image resolution.
//!
//! A book's cover is either an embedded `data:` URI or an external reference
//! (file path or URL). Data URIs are decoded in place; external references go
//! through an [`AssetFetcher`]. A cover that cannot be loaded is a warning,
//! never an export failure.

#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;

use crate::error::{Error, Result};
use crate::model::Book;
use crate::util;

/// Decoded cover image with a sniffed media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub media_type: &'static str,
}

impl CoverImage {
    /// Wrap raw bytes, rejecting anything that is not a recognized image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let media_type = util::sniff_image_media_type(&data)
            .ok_or_else(|| Error::InvalidCover("unrecognized image format".into()))?;
        Ok(Self { data, media_type })
    }

    pub fn extension(&self) -> &'static str {
        util::image_extension(self.media_type)
    }

    /// Re-encode as a base64 data URI for self-contained documents.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.data))
    }
}

/// Whether a cover reference is an embedded data URI.
pub fn is_data_uri(reference: &str) -> bool {
    reference
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Decode a `data:[<media type>][;base64],<payload>` URI.
pub fn decode_data_uri(uri: &str) -> Result<CoverImage> {
    if !is_data_uri(uri) {
        return Err(Error::InvalidCover("not a data URI".into()));
    }
    let (header, payload) = uri[5..]
        .split_once(',')
        .ok_or_else(|| Error::InvalidCover("data URI has no payload".into()))?;

    let is_base64 = header
        .split(';')
        .any(|param| param.trim().eq_ignore_ascii_case("base64"));
    let data = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| Error::InvalidCover(format!("bad base64 payload: {e}")))?
    } else {
        percent_decode_str(payload).collect()
    };
    CoverImage::from_bytes(data)
}

/// Loads external cover references.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Resolves plain paths and `file://` URLs on the local filesystem.
///
/// Relative paths are resolved against `base` when one is set.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Default)]
pub struct FsAssetFetcher {
    base: Option<PathBuf>,
}

#[cfg(not(target_arch = "wasm32"))]
impl FsAssetFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let path = if let Some(rest) = reference.strip_prefix("file://") {
            PathBuf::from(percent_decode_str(rest).decode_utf8_lossy().into_owned())
        } else if reference.contains("://") {
            return Err(Error::InvalidCover(format!(
                "unsupported cover location: {reference}"
            )));
        } else {
            PathBuf::from(reference)
        };

        Ok(match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl AssetFetcher for FsAssetFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.resolve(reference)?;
        Ok(tokio::fs::read(&path).await?)
    }
}

/// Resolve a book's cover. Failures are appended to `warnings` and yield `None`.
pub async fn resolve_cover(
    book: &Book,
    fetcher: &dyn AssetFetcher,
    warnings: &mut Vec<String>,
) -> Option<CoverImage> {
    let source = book.cover_source()?;
    let result = if is_data_uri(source) {
        decode_data_uri(source)
    } else {
        match fetcher.fetch(source).await {
            Ok(data) => CoverImage::from_bytes(data),
            Err(e) => Err(e),
        }
    };
    into_warning(result, source, warnings)
}

/// Resolve a cover without I/O; external references are reported as skipped.
pub fn resolve_embedded_cover(book: &Book, warnings: &mut Vec<String>) -> Option<CoverImage> {
    let source = book.cover_source()?;
    let result = if is_data_uri(source) {
        decode_data_uri(source)
    } else {
        Err(Error::InvalidCover("external covers need an asset fetcher".into()))
    };
    into_warning(result, source, warnings)
}

fn into_warning(
    result: Result<CoverImage>,
    source: &str,
    warnings: &mut Vec<String>,
) -> Option<CoverImage> {
    match result {
        Ok(cover) => Some(cover),
        Err(e) => {
            let shown = if is_data_uri(source) { "embedded image" } else { source };
            tracing::warn!(cover = shown, error = %e, "skipping cover");
            warnings.push(format!("cover skipped ({shown}): {e}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_decode_base64_data_uri() {
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(PNG));
        let cover = decode_data_uri(&uri).unwrap();
        assert_eq!(cover.data, PNG);
        assert_eq!(cover.media_type, "image/png");
        assert_eq!(cover.extension(), "png");
        assert_eq!(decode_data_uri(&cover.to_data_uri()).unwrap(), cover);
    }

    #[test]
    fn test_decode_percent_encoded_data_uri() {
        let uri = "data:image/gif,GIF89a%01%00";
        let cover = decode_data_uri(uri).unwrap();
        assert_eq!(cover.media_type, "image/gif");
        assert_eq!(&cover.data[..6], b"GIF89a");
    }

    #[test]
    fn test_rejects_bad_data_uris() {
        assert!(decode_data_uri("data:image/png;base64").is_err());
        assert!(decode_data_uri("data:image/png;base64,!!!").is_err());
        assert!(decode_data_uri("data:text/plain,hello").is_err());
        assert!(decode_data_uri("https://example.com/a.png").is_err());
    }

    #[tokio::test]
    async fn test_fs_fetcher_reads_relative_and_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cover one.png"), PNG).unwrap();

        let fetcher = FsAssetFetcher::with_base(dir.path());
        assert_eq!(fetcher.fetch("cover one.png").await.unwrap(), PNG);

        let url = format!("file://{}", dir.path().join("cover%20one.png").display());
        assert_eq!(FsAssetFetcher::new().fetch(&url).await.unwrap(), PNG);

        assert!(fetcher.fetch("https://example.com/c.png").await.is_err());
    }
}
