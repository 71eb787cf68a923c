//! Reading-time estimation

use super::article::ContentSection;
use super::rich_text;

/// Fixed reading speed
pub const WORDS_PER_MINUTE: usize = 200;

/// Number of whitespace-delimited tokens in `text`
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Words in a section: heading plus the plain-text body
pub fn section_words(section: &ContentSection) -> usize {
    count_words(&section.heading) + count_words(&rich_text::as_text(&section.body))
}

/// Minutes needed to read all sections, rounded up
pub fn estimate_reading_minutes(sections: &[ContentSection]) -> u32 {
    let total_words: usize = sections.iter().map(section_words).sum();
    total_words.div_ceil(WORDS_PER_MINUTE) as u32
}
