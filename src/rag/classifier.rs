//! Decides whether a chat message needs a knowledge-base lookup.

/// Classifies incoming chat messages.
pub trait QueryClassifier: Send + Sync {
    /// `true` if the message asks for information and retrieval should run.
    fn needs_retrieval(&self, message: &str) -> bool;
}

const QUESTION_WORDS: &[&str] = &[
    "what", "who", "whom", "whose", "when", "where", "why", "how", "which", "is", "are", "was",
    "were", "do", "does", "did", "can", "could", "would", "should", "will", "shall", "may",
    "might", "has", "have", "had",
];

const REQUEST_WORDS: &[&str] = &[
    "tell", "explain", "describe", "summarize", "summarise", "list", "show", "give", "find",
    "compare", "define", "outline", "recommend",
];

const FILLER: &[&str] = &[
    "hi", "hello", "hey", "thanks", "thank you", "thx", "ty", "ok", "okay", "k", "cool", "great",
    "nice", "awesome", "perfect", "got it", "sounds good", "bye", "goodbye", "yes", "no", "sure",
    "good morning", "good evening", "lol", "wow",
];

/// Below this many words a message must look like a question to trigger retrieval.
const SUBSTANTIAL_WORDS: usize = 4;

/// Keyword and punctuation heuristic.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl QueryClassifier for HeuristicClassifier {
    fn needs_retrieval(&self, message: &str) -> bool {
        let message = message.trim();
        if message.is_empty() {
            return false;
        }
        if message.ends_with('?') {
            return true;
        }

        let normalized: String = message
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
            .collect();
        let words: Vec<&str> = normalized.split_whitespace().collect();
        if words.is_empty() {
            return false;
        }

        // "hi, explain overlap" asks the same as "explain overlap".
        let rest = strip_filler(&words);
        if let Some(first) = rest.first() {
            if QUESTION_WORDS.contains(first) || REQUEST_WORDS.contains(first) {
                return true;
            }
        }
        if is_filler(&words, rest) {
            return false;
        }
        words.len() >= SUBSTANTIAL_WORDS
    }
}

/// Words left after leading greetings and acknowledgements.
fn strip_filler<'a, 'b>(words: &'a [&'b str]) -> &'a [&'b str] {
    let mut rest = words;
    loop {
        if rest.len() >= 2 && FILLER.contains(&rest[..2].join(" ").as_str()) {
            rest = &rest[2..];
        } else if rest.first().is_some_and(|w| FILLER.contains(w)) {
            rest = &rest[1..];
        } else {
            break;
        }
    }
    rest
}

/// Greetings and acknowledgements, alone or with a short tail ("thanks a lot").
fn is_filler(words: &[&str], rest: &[&str]) -> bool {
    let consumed = rest.len() < words.len();
    consumed && (rest.is_empty() || words.len() < SUBSTANTIAL_WORDS)
}
