use url::{ParseError, Url};

/// Convenience wrapper for URL generation functions.
#[derive(Clone, Debug)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path of the materials collection, relative to `base`.
    pub(crate) materials_path: String,
}

impl Urls {
    /// Create a new instance. A missing trailing slash on `base` is
    /// added, and surrounding slashes on `materials_path` are ignored.
    pub fn new(base: impl AsRef<str>, materials_path: impl AsRef<str>) -> Result<Self, ParseError> {
        let base = base.as_ref();
        let base = if base.ends_with('/') {
            Url::parse(base)?
        } else {
            Url::parse(&format!("{}/", base))?
        };

        if base.cannot_be_a_base() {
            return Err(ParseError::RelativeUrlWithCannotBeABaseBase);
        }

        Ok(Urls {
            base,
            materials_path: materials_path.as_ref().trim_matches('/').to_owned(),
        })
    }

    pub fn materials(&self) -> Result<Url, ParseError> {
        self.base.join(&self.materials_path)
    }

    /// Returns the URL of one material. The ID is percent-encoded as a
    /// single path segment.
    pub fn material(&self, id: &str) -> Result<Url, ParseError> {
        let mut url = self.materials()?;

        url.path_segments_mut()
            .map_err(|_| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(id);

        Ok(url)
    }
}
