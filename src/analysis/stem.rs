//! Tokenizing and suffix-stripping stemmer for lexical analysis

const MIN_TOKEN_CHARS: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "but", "for", "with", "from", "are", "was", "were", "been",
    "being", "have", "has", "had", "does", "did", "will", "would", "could",
    "should", "may", "might", "shall", "can", "this", "that", "these", "those",
    "its", "she", "they", "you", "his", "her", "their", "your", "our", "not",
    "about", "into", "over", "after", "than", "then", "just", "also", "very",
    "quite", "rather", "some", "any", "each", "all", "more", "most", "such",
    "only", "same", "other", "own", "which", "when", "where", "what", "who",
    "how", "there", "here", "both", "between", "through", "under", "while",
    "because", "page", "see", "section", "chapter", "figure", "table",
];

/// A token as it appeared (lowercased) and its stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub surface: String,
    pub stem: String,
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Alphabetic runs of at least three letters, lowercased, stop-words removed
pub fn tokenize(text: &str) -> impl Iterator<Item = Token> + '_ {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
        .filter(|w| !is_stopword(w))
        .map(|surface| Token {
            stem: stem(&surface),
            surface,
        })
}

/// Strip common English inflections
///
/// Deliberately light: it conflates plural, past and progressive forms
/// ("scores", "scored", "scoring" → "scor") and leaves everything else alone.
pub fn stem(word: &str) -> String {
    let mut w = word.to_lowercase();

    // plurals
    if w.ends_with("sses") {
        w.truncate(w.len() - 2);
    } else if w.ends_with("ies") && w.len() > 4 {
        w.truncate(w.len() - 3);
        w.push('y');
    } else if w.ends_with('s')
        && w.len() > 3
        && !w.ends_with("ss")
        && !w.ends_with("us")
        && !w.ends_with("is")
    {
        w.pop();
    }

    // past and progressive
    for suffix in ["ing", "ed"] {
        if let Some(base) = w.strip_suffix(suffix) {
            if base.chars().count() >= 3 && base.chars().any(is_vowel) {
                w = undouble(base);
                break;
            }
        }
    }

    if let Some(base) = w.strip_suffix("ly") {
        if base.chars().count() > 4 {
            w = base.to_string();
        }
    }

    if w.len() > 4 && w.ends_with('e') {
        w.pop();
    }
    w
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y')
}

/// "runn" → "run", keeping "ll", "ss" and "zz"
fn undouble(base: &str) -> String {
    let chars: Vec<char> = base.chars().collect();
    match chars.as_slice() {
        [.., a, b] if a == b && !is_vowel(*a) && !matches!(a, 'l' | 's' | 'z') => {
            chars[..chars.len() - 1].iter().collect()
        }
        _ => base.to_string(),
    }
}
