//! Transcript reconstruction from out-of-order fragments
//!
//! Streaming providers emit recognized-speech fragments that may arrive
//! out of temporal order. Each fragment carries an opaque `item_id` and an
//! optional `previous_item_id` back-reference; replaying that linkage as a
//! chain from the root yields the true spoken order regardless of arrival
//! order.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One unit of provider-recognized speech
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    /// Opaque provider-assigned identifier
    pub item_id: String,
    /// Back-reference to the temporally preceding item, if known
    pub previous_item_id: Option<String>,
    /// Recognized text; a delta for non-final updates, full text for finals
    pub text: String,
    /// Final text replaces any partial for this item; interim text is a
    /// live guess
    pub is_final: bool,
}

/// Arena-style mapping of `item_id` to fragment, ordered by linkage replay
///
/// Owned by one recording session and cleared on the next. The successor
/// index is derived at render time rather than maintained as pointers, so
/// the cycle guard stays simple: traversal carries a visited set and
/// malformed cyclic linkage terminates with partial text instead of
/// hanging.
#[derive(Debug, Default)]
pub struct TranscriptGraph {
    items: HashMap<String, TranscriptFragment>,
}

impl TranscriptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert one fragment update
    ///
    /// Linkage is recorded when supplied and not already known. A final
    /// fragment overwrites prior partial text for its item; a non-final
    /// fragment appends to a known item (providers stream deltas) or
    /// registers an unknown item provisionally with no back-reference
    /// until a later event supplies linkage.
    pub fn ingest(&mut self, fragment: TranscriptFragment) {
        match self.items.get_mut(&fragment.item_id) {
            Some(existing) => {
                if existing.previous_item_id.is_none() {
                    existing.previous_item_id = fragment.previous_item_id;
                }
                if fragment.is_final {
                    existing.text = fragment.text;
                    existing.is_final = true;
                } else {
                    existing.text.push_str(&fragment.text);
                }
            }
            None => {
                self.items.insert(fragment.item_id.clone(), fragment);
            }
        }
    }

    /// Render the ordered transcript
    ///
    /// Locates the root (no back-reference), walks the derived successor
    /// index until the chain ends or revisits a node, and joins non-empty
    /// texts with a single space. Rendering twice is byte-identical.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return String::new();
        }

        let mut successor: HashMap<&str, &str> = HashMap::new();
        let mut root: Option<&str> = None;
        for (item_id, item) in &self.items {
            match &item.previous_item_id {
                Some(prev) => {
                    successor.insert(prev.as_str(), item_id.as_str());
                }
                None => root = Some(item_id.as_str()),
            }
        }

        let mut ordered: Vec<&str> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = root;
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            if let Some(item) = self.items.get(id) {
                if !item.text.is_empty() {
                    ordered.push(item.text.as_str());
                }
            }
            current = successor.get(id).copied();
        }

        ordered.join(" ")
    }

    /// Reset for a new recording session
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
