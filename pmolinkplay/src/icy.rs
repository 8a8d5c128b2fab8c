//! ICY (SHOUTcast) metadata interleaving
//!
//! When a client sends `Icy-MetaData: 1`, a metadata block is inserted
//! after every `metaint` audio bytes. The block is a length byte (in units
//! of 16 bytes) followed by the padded text; a lone zero byte means
//! "unchanged".

use bytes::{Bytes, BytesMut};
use tokio::sync::watch;

/// Default audio bytes between two metadata blocks
pub const DEFAULT_ICY_METAINT: usize = 16000;

const MAX_BLOCK_LEN: usize = 255 * 16;

/// Now-playing text carried in the stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcyMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub artwork_url: Option<String>,
    /// Bumped on every change
    pub version: u64,
}

impl IcyMetadata {
    pub fn stream_title(&self) -> String {
        match &self.artist {
            Some(artist) if !artist.is_empty() => format!("{} - {}", artist, self.title),
            _ => self.title.clone(),
        }
    }
}

/// Formats one metadata block, length byte included
///
/// An oversized title is shortened on a character boundary so that both
/// fields stay well formed; the URL is dropped when it cannot fit at all.
pub fn format_icy_block(meta: &IcyMetadata) -> Bytes {
    const TITLE_FIELD: usize = "StreamTitle='';".len();

    // A quote would end the field early
    let title = meta.stream_title().replace('\'', "\u{2019}");
    let url_field = meta
        .artwork_url
        .as_ref()
        .map(|url| format!("StreamUrl='{}';", url))
        .filter(|field| TITLE_FIELD + field.len() <= MAX_BLOCK_LEN)
        .unwrap_or_default();

    let budget = MAX_BLOCK_LEN - TITLE_FIELD - url_field.len();
    let title = truncate_on_char_boundary(&title, budget);
    let data = format!("StreamTitle='{}';{}", title, url_field).into_bytes();

    let padded_length = data.len().div_ceil(16) * 16;
    let mut block = Vec::with_capacity(1 + padded_length);
    block.push((padded_length / 16) as u8);
    block.extend_from_slice(&data);
    block.resize(1 + padded_length, 0);
    Bytes::from(block)
}

fn truncate_on_char_boundary(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Interleaves metadata blocks into one client's audio stream
pub struct IcyInjector {
    metaint: usize,
    until_meta: usize,
    metadata: watch::Receiver<IcyMetadata>,
    sent_version: Option<u64>,
}

impl IcyInjector {
    pub fn new(metaint: usize, metadata: watch::Receiver<IcyMetadata>) -> Self {
        let metaint = metaint.max(1);
        Self {
            metaint,
            until_meta: metaint,
            metadata,
            sent_version: None,
        }
    }

    /// Returns `chunk` with metadata blocks inserted at the right offsets
    pub fn inject(&mut self, chunk: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(chunk.len() + 64);
        let mut rest = chunk;

        while !rest.is_empty() {
            let take = rest.len().min(self.until_meta);
            out.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            self.until_meta -= take;

            if self.until_meta == 0 {
                out.extend_from_slice(&self.next_block());
                self.until_meta = self.metaint;
            }
        }
        out.freeze()
    }

    fn next_block(&mut self) -> Bytes {
        let meta = self.metadata.borrow();
        if self.sent_version == Some(meta.version) {
            return Bytes::from_static(&[0]);
        }
        self.sent_version = Some(meta.version);
        format_icy_block(&meta)
    }
}
