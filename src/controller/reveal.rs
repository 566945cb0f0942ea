//! Word-by-word reveal of an already complete response.

/// Lazy sequence of growing prefixes of `text`, one per word.
///
/// The last item is always the full text.
#[derive(Clone, Debug)]
pub struct WordReveal<'a> {
    text: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> WordReveal<'a> {
    /// Reveal `text`.
    #[must_use]
    pub const fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for WordReveal<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let rest = &self.text[self.pos..];
        let word_start = rest.len() - rest.trim_start().len();
        let word = &rest[word_start..];
        let word_len = word.find(char::is_whitespace).unwrap_or(word.len());
        let end = self.pos + word_start + word_len;

        if self.text[end..].trim().is_empty() {
            self.done = true;
            return Some(self.text);
        }

        self.pos = end;
        Some(&self.text[..end])
    }
}
