//! Turns untrusted post and comment markup into inert plain text.

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_BREAK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</p\s*>|<p(\s[^>]*)?>").expect("valid line break regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank regex"));

/// Strips tags, decodes entities, and drops control characters other than
/// newlines and tabs. Decoding happens after stripping, so `&lt;b&gt;` shows up
/// literally as `<b>` and is never treated as a tag.
pub fn to_plain_text(raw: &str) -> String {
    let with_breaks = LINE_BREAK_RE.replace_all(raw, "\n");
    let without_tags = TAG_RE.replace_all(&with_breaks, "");
    let decoded = html_escape::decode_html_entities(&*without_tags);
    let printable: String = decoded
        .chars()
        .filter(|ch| !ch.is_control() || *ch == '\n' || *ch == '\t')
        .collect();
    BLANK_RUN_RE
        .replace_all(printable.trim(), "\n\n")
        .into_owned()
}

/// Character-bounded preview; appends an ellipsis when `text` is cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head.trim_end())
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_tags_become_text() {
        let text = to_plain_text("<script>alert(1)</script>hi");
        assert_eq!(text, "alert(1)hi");
    }

    #[test]
    fn escaped_markup_is_shown_literally() {
        assert_eq!(to_plain_text("a &lt;b&gt; c &amp; d"), "a <b> c & d");
    }

    #[test]
    fn breaks_become_newlines() {
        assert_eq!(to_plain_text("one<br>two<BR/>three"), "one\ntwo\nthree");
        assert_eq!(to_plain_text("<p>one</p><p>two</p>"), "one\n\ntwo");
    }

    #[test]
    fn control_sequences_are_dropped() {
        assert_eq!(to_plain_text("red\u{1b}[31m text\u{7}"), "red[31m text");
    }

    #[test]
    fn chinese_text_passes_through() {
        assert_eq!(to_plain_text("今天天气不错"), "今天天气不错");
    }

    #[test]
    fn preview_cuts_on_characters() {
        assert_eq!(preview("树洞树洞", 2), "树洞…");
        assert_eq!(preview("短", 5), "短");
    }
}
