//! Request fingerprints and store path derivation
//!
//! Two different digests live here:
//! - the store key for a request (`full/<sha1(url)><ext>`), derived from the
//!   escaped URL exactly as given so keys stay stable across runs
//! - the request fingerprint used to coalesce equivalent requests, derived
//!   from a canonical form of the URL

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sha1::{Digest, Sha1};

use crate::item::ItemAdapter;
use crate::media_types;
use crate::types::{MediaRequest, Response};

/// Bytes that are never valid unescaped in a URL
const UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Trim surrounding whitespace and percent-encode unsafe bytes
///
/// Existing `%XX` escapes and reserved characters are left alone, so applying
/// this twice gives the same result as applying it once.
pub fn safe_url_string(url: &str) -> String {
    utf8_percent_encode(url.trim(), UNSAFE).to_string()
}

/// Lowercase hex SHA-1 of `data`
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Maps a request to the store key its file is saved under
///
/// The pipeline derives every key through this trait. Closures with the
/// matching signature implement it.
pub trait FilePathStrategy: Send + Sync {
    /// Store key for `request`; `response` is present once the file was fetched
    fn file_path(
        &self,
        request: &MediaRequest,
        response: Option<&Response>,
        item: Option<&dyn ItemAdapter>,
    ) -> String;
}

impl<F> FilePathStrategy for F
where
    F: Fn(&MediaRequest, Option<&Response>, Option<&dyn ItemAdapter>) -> String + Send + Sync,
{
    fn file_path(
        &self,
        request: &MediaRequest,
        response: Option<&Response>,
        item: Option<&dyn ItemAdapter>,
    ) -> String {
        self(request, response, item)
    }
}

/// `<subdir>/<sha1 of url><ext>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultFilePath {
    subdir: String,
}

impl Default for DefaultFilePath {
    fn default() -> Self {
        Self::new("full")
    }
}

impl DefaultFilePath {
    /// Keys under a custom top-level directory
    pub fn new(subdir: impl Into<String>) -> Self {
        Self {
            subdir: subdir.into(),
        }
    }
}

impl FilePathStrategy for DefaultFilePath {
    fn file_path(
        &self,
        request: &MediaRequest,
        _response: Option<&Response>,
        _item: Option<&dyn ItemAdapter>,
    ) -> String {
        format!(
            "{}/{}{}",
            self.subdir,
            sha1_hex(request.url.as_bytes()),
            media_extension(&request.url)
        )
    }
}

/// Suffix of the last path component: text from the last `.` when that dot is
/// neither the first nor the last character of the component
fn url_suffix(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(i) if i + 1 == name.len() => "",
        Some(i) => &name[i..],
    }
}

/// Extension appended to a store key for `url`, possibly empty
pub fn media_extension(url: &str) -> String {
    let suffix = url_suffix(url);
    if media_types::is_known_extension(suffix) {
        return suffix.to_string();
    }
    let lowered = suffix.to_ascii_lowercase();
    let guessed = media_types::mime_for_extension(&lowered)
        .map(str::to_string)
        .or_else(|| media_types::data_uri_media_type(url));
    guessed
        .and_then(|mime| media_types::preferred_extension(&mime))
        .unwrap_or_default()
        .to_string()
}

/// Fingerprints requests so that equivalent URLs coalesce
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestFingerprinter;

impl RequestFingerprinter {
    /// SHA-1 hex of the canonical URL
    pub fn fingerprint(&self, request: &MediaRequest) -> String {
        sha1_hex(canonicalize_url(&request.url).as_bytes())
    }
}

/// Canonical form of a URL: fragment dropped, query pairs sorted; the URL
/// parser lowercases the host and drops default ports. Unparseable input is
/// returned unchanged.
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    url.set_fragment(None);
    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            pairs.sort();
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }
    url.to_string()
}
