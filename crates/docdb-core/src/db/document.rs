///
/// Document
///
/// One stored document. Inputs carry content and optionally a key and media
/// type; outputs carry whatever columns the compiled result shape produced.
/// Header documents (from `*_and_get` writes) have no content.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Document {
    pub(crate) key: Option<String>,
    pub(crate) content: Option<Vec<u8>>,
    pub(crate) media_type: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) last_modified: Option<String>,
    pub(crate) created_on: Option<String>,
}

impl Document {
    /// Media type assumed when a collection stores media types but the
    /// document does not name one.
    pub const DEFAULT_MEDIA_TYPE: &'static str = "application/json";

    #[must_use]
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    #[must_use]
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Content as UTF-8 text, if present and valid.
    #[must_use]
    pub fn content_str(&self) -> Option<&str> {
        self.content().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    #[must_use]
    pub fn into_content(self) -> Option<Vec<u8>> {
        self.content
    }

    #[must_use]
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    #[must_use]
    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    #[must_use]
    pub fn created_on(&self) -> Option<&str> {
        self.created_on.as_deref()
    }

    /// Fill missing header columns from `other`; present values win.
    #[must_use]
    pub(crate) fn fill_from(mut self, other: Self) -> Self {
        self.key = self.key.or(other.key);
        self.content = self.content.or(other.content);
        self.media_type = self.media_type.or(other.media_type);
        self.version = self.version.or(other.version);
        self.last_modified = self.last_modified.or(other.last_modified);
        self.created_on = self.created_on.or(other.created_on);
        self
    }
}
