//! This module provides the text formatting features.
//!
//! Formatting is a pipeline of full-text rewrites applied in order:
//! 1. blank lines are collapsed (`\n\n` becomes `\n`),
//! 2. whitespace at the very start and the very end of the text is stripped,
//! 3. indentation following a line terminator is stripped,
//! 4. any whitespace preceding a line terminator is merged with it into a single space,
//! 5. the resulting single line is cut into chunks of [`LINE_WIDTH`] bytes joined by `\n`.
//!
//! Whitespace is the ASCII set `[\t\n\f\r ]` and the line terminator is `\n`.

use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::LazyLock;

use bytes::Bytes;
use regex::bytes::Regex;

use crate::Error;

/// Default line width of formatted texts, in bytes.
pub const LINE_WIDTH: NonZeroUsize = unsafe { NonZeroUsize::new_unchecked(70) };

const LINE_TERMINATOR: u8 = b'\n';

static BLANK_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\n").unwrap());
static LEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\t\n\f\r ]+").unwrap());
static TRAILING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\t\n\f\r ]+$").unwrap());
static INDENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[\t\n\f\r ]+").unwrap());
static LINE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\t\n\f\r ]*\n").unwrap());

/// Format `raw` text with the default [`LINE_WIDTH`].
///
/// ```
/// let text = rewrap::format::format(b"Hello,\n\n   world!\n");
///
/// assert_eq!(text, b"Hello, world!");
/// ```
#[inline]
pub fn format(raw: &[u8]) -> Vec<u8> {
    format_with_width(raw, LINE_WIDTH)
}

/// Format `raw` text, cutting lines every `width` bytes.
pub fn format_with_width(raw: &[u8], width: NonZeroUsize) -> Vec<u8> {
    rewrap(&normalize(raw), width)
}

/// Normalize whitespaces of `raw` text into a single line of words.
///
/// The returned line never contains any line terminator, nor starts or ends with whitespace.
pub fn normalize(raw: &[u8]) -> Vec<u8> {
    let data = replace_owned(Cow::Borrowed(raw), &BLANK_LINE_RE, b"\n");
    let data = strip(strip(data, &LEADING_RE), &TRAILING_RE);
    let data = replace_owned(data, &INDENT_RE, b"\n");

    replace_owned(data, &LINE_END_RE, b" ").into_owned()
}

/// Cut `line` into chunks of exactly `width` bytes, but the last one, joined by line terminators.
///
/// No empty chunk is ever emitted, so that an empty `line` results in an empty text and
/// a `line` whose length is a multiple of `width` does not end with a line terminator.
pub fn rewrap(line: &[u8], width: NonZeroUsize) -> Vec<u8> {
    let mut text = Vec::with_capacity(line.len() + line.len() / width.get());

    for (i, chunk) in line.chunks(width.get()).enumerate() {
        if i > 0 {
            text.push(LINE_TERMINATOR);
        }
        text.extend_from_slice(chunk);
    }

    text
}

/// Read the file at `path` and format its contents, cutting lines every `width` bytes.
pub async fn read_and_format(path: &Path, width: NonZeroUsize) -> Result<Bytes, Error> {
    tracing::debug!("Reading text file: `{}`", path.display());

    let raw = tokio::fs::read(path).await.map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let text = format_with_width(&raw, width);

    tracing::debug!("Formatted {} bytes into {} bytes: `{}`", raw.len(), text.len(), path.display());

    Ok(text.into())
}

#[inline]
fn strip<'a>(data: Cow<'a, [u8]>, re: &Regex) -> Cow<'a, [u8]> {
    replace_owned(data, re, b"")
}

// `Regex::replace_all` borrows its haystack, so an already owned text must be handled apart
fn replace_owned<'a>(data: Cow<'a, [u8]>, re: &Regex, rep: &[u8]) -> Cow<'a, [u8]> {
    match data {
        Cow::Borrowed(data) => re.replace_all(data, rep),
        Cow::Owned(data) => {
            let replaced = match re.replace_all(&data, rep) {
                Cow::Borrowed(_) => None,
                Cow::Owned(replaced) => Some(replaced),
            };
            Cow::Owned(replaced.unwrap_or(data))
        }
    }
}
