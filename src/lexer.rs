//! Word splitting for command lines.

/// Characters that separate words of a command line.
pub const WORD_DELIMITERS: &str = " \t";

/// Character that separates chained commands on one input line.
pub const CHAIN_SEPARATOR: char = ';';

/// Split `text` into the words separated by any of the characters in `delimiters`.
///
/// Runs of delimiters count as one separator. Returns `None` when `text` holds no word.
pub fn tokenize(text: &str, delimiters: &str) -> Option<Vec<String>> {
    let words: Vec<String> = text
        .split(|c| delimiters.contains(c))
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect();
    if words.is_empty() { None } else { Some(words) }
}

/// Whether `text` consists of delimiter characters only.
pub fn is_blank(text: &str, delimiters: &str) -> bool {
    text.chars().all(|c| delimiters.contains(c))
}
