use serde::{Serialize, Deserialize};
use std::fmt;

/// A short description of one owned clothing piece. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WardrobeItem(String);

impl WardrobeItem {
    pub fn new(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for WardrobeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Splits a comma separated list into trimmed, non-empty items, keeping order and duplicates.
pub fn parse_wardrobe(text: &str) -> Vec<WardrobeItem> {
    text.split(',').filter_map(WardrobeItem::new).collect()
}

/// Bulk text items first, then confirmed image tags in the order they were confirmed.
pub fn assemble_wardrobe(text: &str, confirmed_tags: &[String]) -> Vec<WardrobeItem> {
    let mut items = parse_wardrobe(text);
    items.extend(confirmed_tags.iter().filter_map(|t| WardrobeItem::new(t)));
    items
}
