//! Sentence and word splitting.
//!
//! The splitting rule is part of the wire contract: clients and storage
//! nodes parse the same content independently and must agree on indices.
//! Every `.`, `!`, or `?` ends a sentence regardless of context, so
//! abbreviations like `e.g.` split too. That is observable protocol
//! behavior, not something to fix.

/// Splits `content` into sentences. The delimiter stays with the preceding
/// sentence; surrounding whitespace is trimmed; empty pieces are dropped.
pub fn split_sentences(content: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in content.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Splits a sentence into whitespace-separated words.
pub fn split_words(sentence: &str) -> Vec<String> {
    sentence.split_whitespace().map(str::to_string).collect()
}

/// Word, character, and sentence counts for a whole document.
pub fn counters(content: &str) -> (usize, usize, usize) {
    let words = content.split_whitespace().count();
    let chars = content.chars().count();
    let sentences = split_sentences(content).len();
    (words, chars, sentences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_every_delimiter() {
        assert_eq!(
            split_sentences("Hello world. How are you? Fine!"),
            vec!["Hello world.", "How are you?", "Fine!"]
        );
    }

    #[test]
    fn splits_inside_abbreviations() {
        // Contractual oddity: "e.g." is two sentences.
        assert_eq!(split_sentences("See e.g. below."), vec!["See e.", "g.", "below."]);
    }

    #[test]
    fn keeps_trailing_fragment_without_delimiter() {
        assert_eq!(split_sentences("First. trailing bit"), vec!["First.", "trailing bit"]);
    }

    #[test]
    fn drops_empty_pieces() {
        assert_eq!(split_sentences("..!?"), Vec::<String>::new());
        assert_eq!(split_sentences("  a.   . b.  "), vec!["a.", "b."]);
        assert_eq!(split_sentences(""), Vec::<String>::new());
    }

    #[test]
    fn words_split_on_any_whitespace() {
        assert_eq!(split_words("one  two\tthree\n"), vec!["one", "two", "three"]);
        assert_eq!(split_words(""), Vec::<String>::new());
    }

    #[test]
    fn counters_agree_with_the_splitters() {
        let (words, chars, sentences) = counters("Hi there. Bye!");
        assert_eq!(words, 3);
        assert_eq!(chars, 14);
        assert_eq!(sentences, 2);
    }
}
