//! Pre-splitting of oversized segments.
//!
//! Whole documents and pasted text arrive as one giant segment. Before the
//! overlap chunker runs, such a segment is cut into sentence groups of about
//! `cap` characters; a single sentence longer than twice the cap is cut again
//! on whitespace.

use regex::Regex;

/// Splits long text into sentence-aligned pieces.
pub struct SentenceSplitter {
    sentence: Regex,
    cap: usize,
}

impl SentenceSplitter {
    /// Create a splitter producing pieces of roughly `cap` characters.
    pub fn new(cap: usize) -> Self {
        // A run of sentence-final punctuation followed by whitespace or end of input.
        // Terminators inside a token ("3.14", "example.com") never match.
        let sentence = Regex::new(r"[.!?]+(?:\s+|$)").expect("Invalid regex");
        Self {
            sentence,
            cap: cap.max(1),
        }
    }

    /// Split text into ordered pieces.
    ///
    /// Sentences are sliced out of the original text, so joining the pieces
    /// with single spaces reproduces it up to whitespace between sentences.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();
        let mut current_chars = 0usize;

        for sentence in self.sentences(text) {
            let sentence_chars = sentence.chars().count();

            if sentence_chars > self.cap * 2 {
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                    current_chars = 0;
                }
                pieces.extend(self.split_words(sentence));
                continue;
            }

            if current_chars > 0 && current_chars + 1 + sentence_chars > self.cap {
                pieces.push(std::mem::take(&mut current));
                current_chars = 0;
            }

            if current_chars > 0 {
                current.push(' ');
                current_chars += 1;
            }
            current.push_str(sentence);
            current_chars += sentence_chars;
        }

        if !current.is_empty() {
            pieces.push(current);
        }

        pieces
    }

    /// Trimmed, non-empty sentences in order, including any unterminated tail.
    fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut sentences = Vec::new();
        let mut start = 0;
        for boundary in self.sentence.find_iter(text) {
            sentences.push(text[start..boundary.end()].trim());
            start = boundary.end();
        }
        sentences.push(text[start..].trim());
        sentences.retain(|s| !s.is_empty());
        sentences
    }

    /// Split one long sentence on whitespace into pieces of at most `cap` characters.
    fn split_words(&self, sentence: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();
        let mut current_chars = 0usize;

        for word in sentence.split_whitespace() {
            let word_chars = word.chars().count();

            if word_chars > self.cap {
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                    current_chars = 0;
                }
                let chars: Vec<char> = word.chars().collect();
                pieces.extend(chars.chunks(self.cap).map(|c| c.iter().collect::<String>()));
                continue;
            }

            if current_chars > 0 && current_chars + 1 + word_chars > self.cap {
                pieces.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            if current_chars > 0 {
                current.push(' ');
                current_chars += 1;
            }
            current.push_str(word);
            current_chars += word_chars;
        }

        if !current.is_empty() {
            pieces.push(current);
        }

        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_sentences_up_to_cap() {
        let splitter = SentenceSplitter::new(20);
        let pieces = splitter.split("One two. Three four. Five six seven eight!");
        assert_eq!(pieces, vec!["One two. Three four.", "Five six seven eight!"]);
    }

    #[test]
    fn test_text_without_terminator_is_kept() {
        let splitter = SentenceSplitter::new(100);
        assert_eq!(splitter.split("no punctuation here"), vec!["no punctuation here"]);
    }

    #[test]
    fn test_long_sentence_falls_back_to_words() {
        let splitter = SentenceSplitter::new(10);
        let sentence = "alpha beta gamma delta epsilon zeta eta theta";
        let pieces = splitter.split(sentence);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.chars().count() <= 10));
        assert_eq!(pieces.join(" "), sentence);
    }

    #[test]
    fn test_inner_punctuation_is_not_a_boundary() {
        let splitter = SentenceSplitter::new(40);
        let text = "...and so it begins. Pi is roughly 3.14 today. See example.com for v1.2.3 notes!";
        let pieces = splitter.split(text);
        assert_eq!(
            pieces,
            vec![
                "...and so it begins.",
                "Pi is roughly 3.14 today.",
                "See example.com for v1.2.3 notes!"
            ]
        );
        assert_eq!(pieces.join(" "), text);
    }

    #[test]
    fn test_punctuation_only_text_is_kept() {
        let splitter = SentenceSplitter::new(4);
        let pieces = splitter.split("!!!!!!!!!!");
        assert_eq!(pieces.concat(), "!!!!!!!!!!");
    }

    #[test]
    fn test_giant_word_is_hard_split() {
        let splitter = SentenceSplitter::new(4);
        let pieces = splitter.split("abcdefghij");
        assert_eq!(pieces, vec!["abcd", "efgh", "ij"]);
    }
}
