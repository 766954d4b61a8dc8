//! Picks the span of a result's content that best shows why it matched.
//!
//! Windows of 100, 200 and 300 characters slide across the lowercased content
//! in half-window steps. A window scores two points per distinct query word it
//! contains, plus a bonus for how tightly the matches cluster and a bonus for
//! how close the first match sits to the window start. The single best window
//! (first seen wins ties) is widened by 20 characters of context on each side.
//!
//! Offsets are in characters. Cost grows with content length times query
//! length, so truncate multi-megabyte content before calling [`locate`].

pub const WINDOW_SIZES: [usize; 3] = [100, 200, 300];
pub const CONTEXT_MARGIN: usize = 20;

/// Query words shorter than this are ignored.
const MIN_WORD_LEN: usize = 3;

/// `(start, end)` character offsets into `content`, `0 <= start <= end <= len`.
/// `(0, 0)` when the query has no usable words or nothing matched.
pub fn locate(content: &str, query: &str) -> (usize, usize) {
    let raw_words: Vec<Vec<char>> = query
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .map(|w| w.chars().map(lower_char).collect())
        .collect();
    let Some(last_word) = raw_words.last() else {
        return (0, 0);
    };
    // The span end is padded by the length of the query's final word, whichever
    // word actually sits at the last match.
    let tail_len = last_word.len();

    let mut words: Vec<&[char]> = Vec::with_capacity(raw_words.len());
    for w in &raw_words {
        if !words.contains(&w.as_slice()) {
            words.push(w);
        }
    }

    let text: Vec<char> = content.chars().map(lower_char).collect();
    let len = text.len();

    let mut best: Option<(f64, usize, usize)> = None;
    for window_size in WINDOW_SIZES {
        let step = window_size / 2;
        let ws = window_size as f64;
        for start in (0..len).step_by(step) {
            let window = &text[start..(start + window_size).min(len)];
            let positions: Vec<usize> = words.iter().filter_map(|w| find(window, w)).collect();
            let (Some(&first), Some(&last)) = (positions.iter().min(), positions.iter().max()) else {
                continue;
            };
            let matches = positions.len() as f64;
            let proximity = (ws - (last - first) as f64) / ws;
            let position_bonus = 1.0 - first as f64 / ws;
            let score = matches * 2.0 + proximity + position_bonus;
            if best.map_or(true, |(b, _, _)| score > b) {
                best = Some((score, start + first, start + last + tail_len));
            }
        }
    }

    match best {
        Some((_, first, last)) => {
            let start = first.saturating_sub(CONTEXT_MARGIN).min(len);
            let end = (last + CONTEXT_MARGIN).min(len).max(start);
            (start, end)
        }
        None => (0, 0),
    }
}

/// Single-char lowercase so offsets in the lowered text line up with `content`.
fn lower_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn find(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_usable_query_words() {
        assert_eq!(locate("some content here", "a an to"), (0, 0));
        assert_eq!(locate("some content here", ""), (0, 0));
    }

    #[test]
    fn no_match_returns_zero_span() {
        assert_eq!(locate("nothing relevant", "zebra"), (0, 0));
        assert_eq!(locate("", "zebra"), (0, 0));
    }

    #[test]
    fn short_content_spans_both_words() {
        let content = "The quick brown fox jumps";
        let (start, end) = locate(content, "quick fox");
        assert!(start <= 4);
        assert!(end >= 16 + "fox".len());
        assert_eq!((start, end), (0, content.chars().count()));
    }

    #[test]
    fn case_insensitive() {
        let content = format!("{}RUST language{}", "x".repeat(200), "y".repeat(200));
        let (start, end) = locate(&content, "rust");
        assert_eq!((start, end), (180, 224));
    }

    #[test]
    fn multi_char_lowercase_matches_itself() {
        // 'İ' lowercases to two chars; both sides must fold it the same way.
        let content = "Welcome to İstanbul travel guide";
        assert_eq!(locate(content, "İstanbul"), (0, content.chars().count()));
        assert_eq!(locate(content, "İSTANBUL"), (0, content.chars().count()));
    }

    #[test]
    fn clustered_matches_beat_scattered_ones() {
        let filler = "lorem ipsum dolor sit amet ".repeat(20);
        let content = format!("alpha {filler} beta {filler} alpha beta {filler}");
        let (start, end) = locate(&content, "alpha beta");
        let span: String = content.chars().skip(start).take(end - start).collect();
        assert!(span.contains("alpha beta"), "span was {span:?}");
    }

    #[test]
    fn last_word_length_pads_the_span() {
        // "longerword" ends the query, so the end pads by its length even though
        // the last match is the short word.
        let content = format!("{}longerword cat{}", "z".repeat(150), "z".repeat(150));
        let (_, end) = locate(&content, "cat longerword");
        let cat = 150 + "longerword ".len();
        assert_eq!(end, cat + "longerword".len() + CONTEXT_MARGIN);
    }

    #[test]
    fn bounds_hold_for_unicode_and_edges() {
        let cases = [
            ("ÀÉÎÕÜ straße İstanbul".to_string(), "straße istanbul"),
            ("fox".to_string(), "fox"),
            ("ab".to_string(), "abc"),
            ("word ".repeat(500), "word other"),
            (format!("{}end", "x".repeat(297)), "end xxxxxxxx"),
        ];
        for (content, query) in &cases {
            let (s, e) = locate(content, query);
            assert!(s <= e && e <= content.chars().count(), "{content:?} {query:?} -> {s},{e}");
        }
    }
}
