use serde::{Deserialize, Serialize};

/// A reference from generated text back to a source.
///
/// Variants follow the vendors' `type` discriminators. Any discriminator this crate
/// does not know about deserializes to [`Citation::Unknown`] instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Citation {
    /// Character range inside a plain-text document.
    CharLocation {
        cited_text: String,
        document_index: usize,
        #[serde(default)]
        document_title: Option<String>,
        start_char_index: usize,
        end_char_index: usize,
    },
    /// Page range inside a PDF document.
    PageLocation {
        cited_text: String,
        document_index: usize,
        #[serde(default)]
        document_title: Option<String>,
        start_page_number: usize,
        end_page_number: usize,
    },
    /// Block range inside a custom-content document.
    ContentBlockLocation {
        cited_text: String,
        document_index: usize,
        #[serde(default)]
        document_title: Option<String>,
        start_block_index: usize,
        end_block_index: usize,
    },
    WebSearchResultLocation {
        #[serde(default)]
        cited_text: String,
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        encrypted_index: Option<String>,
    },
    SearchResultLocation {
        cited_text: String,
        source: String,
        #[serde(default)]
        title: Option<String>,
        search_result_index: usize,
        start_block_index: usize,
        end_block_index: usize,
    },
    #[serde(other)]
    Unknown,
}

impl Citation {
    /// Vendor discriminator string for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Citation::CharLocation { .. } => "char_location",
            Citation::PageLocation { .. } => "page_location",
            Citation::ContentBlockLocation { .. } => "content_block_location",
            Citation::WebSearchResultLocation { .. } => "web_search_result_location",
            Citation::SearchResultLocation { .. } => "search_result_location",
            Citation::Unknown => "unknown",
        }
    }

    pub fn cited_text(&self) -> Option<&str> {
        match self {
            Citation::CharLocation { cited_text, .. }
            | Citation::PageLocation { cited_text, .. }
            | Citation::ContentBlockLocation { cited_text, .. }
            | Citation::WebSearchResultLocation { cited_text, .. }
            | Citation::SearchResultLocation { cited_text, .. } => Some(cited_text),
            Citation::Unknown => None,
        }
    }

    /// URL-only citation, as produced by search-grounded vendors.
    pub fn web(url: impl Into<String>, title: Option<String>) -> Self {
        Citation::WebSearchResultLocation {
            cited_text: String::new(),
            url: url.into(),
            title,
            encrypted_index: None,
        }
    }
}
