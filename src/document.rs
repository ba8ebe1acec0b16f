//! Cursor-anchored document merge
//!
//! Combines reconstructed/streaming session text with a pre-existing
//! editable document at a tracked insertion offset. Offsets are counted in
//! characters so a split can never land inside a UTF-8 sequence.

/// Editable text plus a tracked cursor offset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    text: String,
    cursor_offset: usize,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor_offset = text.chars().count();
        Self {
            text,
            cursor_offset,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor_offset(&self) -> usize {
        self.cursor_offset
    }

    /// Move the caret; clamped to the document length
    pub fn set_cursor(&mut self, offset: usize) {
        self.cursor_offset = offset.min(self.text.chars().count());
    }

    /// Direct user edit: replace the text and recompute the cursor
    pub fn edit(&mut self, text: impl Into<String>, cursor_offset: usize) {
        self.text = text.into();
        self.set_cursor(cursor_offset);
    }

    fn split_at_chars(text: &str, offset: usize) -> (String, String) {
        let byte_idx = text
            .char_indices()
            .nth(offset)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        (text[..byte_idx].to_string(), text[byte_idx..].to_string())
    }
}

/// Join two pieces with a single separating space
///
/// A space is inserted only when both sides are non-empty and neither side
/// already has boundary whitespace, so merges never double or drop spaces.
pub fn join_with_space(left: &str, right: &str) -> String {
    if left.is_empty() {
        return right.to_string();
    }
    if right.is_empty() {
        return left.to_string();
    }
    let boundary_ws = left.ends_with(char::is_whitespace) || right.starts_with(char::is_whitespace);
    if boundary_ws {
        format!("{}{}", left, right)
    } else {
        format!("{} {}", left, right)
    }
}

/// Merge state for one recording session
///
/// The document is split once at the captured cursor; finalized fragments
/// accumulate between the halves while the latest interim guess is shown
/// after them, replaced wholesale on each update. Only finalized text
/// survives `finish` - a session that dies before any fragment finalizes
/// leaves the document untouched.
#[derive(Debug, Clone)]
pub struct RecordingMerge {
    before: String,
    after: String,
    committed: String,
    interim: String,
}

impl RecordingMerge {
    /// Capture the insertion anchor from the document's current cursor
    pub fn begin(document: &Document) -> Self {
        let (before, after) = Document::split_at_chars(&document.text, document.cursor_offset);
        Self {
            before,
            after,
            committed: String::new(),
            interim: String::new(),
        }
    }

    /// Accumulate one finalized fragment
    pub fn apply_final(&mut self, text: &str) {
        self.committed = join_with_space(&self.committed, text);
        self.interim.clear();
    }

    /// Replace the live interim guess (never concatenated)
    pub fn apply_interim(&mut self, text: &str) {
        self.interim = text.to_string();
    }

    /// Move the insertion anchor mid-recording
    ///
    /// Re-splits the current committed rendering at the new offset and
    /// restarts accumulation there. Interim text is ephemeral and is not
    /// baked into the new base.
    pub fn relocate(&mut self, offset: usize) {
        let rendered = join_with_space(&join_with_space(&self.before, &self.committed), &self.after);
        let (before, after) = Document::split_at_chars(&rendered, offset);
        self.before = before;
        self.after = after;
        self.committed.clear();
        self.interim.clear();
    }

    /// Current full rendering, interim included
    pub fn render(&self) -> String {
        let with_session = join_with_space(
            &join_with_space(&self.before, &self.committed),
            &self.interim,
        );
        join_with_space(&with_session, &self.after)
    }

    /// Exactly one final merge; interim is discarded
    pub fn finish(self) -> Document {
        let head = join_with_space(&self.before, &self.committed);
        let text = join_with_space(&head, &self.after);
        let cursor_offset = head.chars().count();
        Document {
            text,
            cursor_offset,
        }
    }
}
