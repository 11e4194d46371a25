//! HTML character-reference decoding for human-readable feed fields.
//!
//! Titles and summaries are decoded; `content_html` is left alone —
//! it is markup, and decoding it would corrupt entity-escaped code
//! samples and the like.

use html_escape::decode_html_entities;

/// Decode named and numeric (decimal and hex) character references.
/// Input without an ampersand is returned unchanged.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    decode_html_entities(text).into_owned()
}

/// Decode an optional human-readable field, trimming surrounding
/// whitespace. Empty results become `None`.
pub fn decoded_text_field(text: Option<&str>) -> Option<String> {
    let decoded = decode_entities(text?.trim());
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}
