use crate::patterns::{ANY_TAG_RE, NBSP_RE};

/// Count words in a rich-HTML body.
///
/// Strips every markup tag, then counts whitespace-delimited tokens. This is
/// the only word-count function; book totals are sums of its results.
///
/// ```
/// use scriptorium::model::word_count;
///
/// assert_eq!(word_count("<p>Hello <b>brave</b> new world</p>"), 4);
/// assert_eq!(word_count(""), 0);
/// ```
pub fn word_count(html: &str) -> i64 {
    let text = ANY_TAG_RE.replace_all(html, " ");
    let text = NBSP_RE.replace_all(&text, " ");
    text.split_whitespace().count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_separate_words() {
        assert_eq!(word_count("<p>one</p><p>two</p>"), 2);
        assert_eq!(word_count("<p>one<br>two</p>"), 2);
    }

    #[test]
    fn test_tag_boundaries_are_whitespace() {
        assert_eq!(word_count("<p>un<em>believ</em>able</p>"), 3);
    }

    #[test]
    fn test_whitespace_only() {
        assert_eq!(word_count("<p>   </p>\n<p>&nbsp;</p>"), 0);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(word_count("It was a dark and stormy night."), 7);
    }
}
