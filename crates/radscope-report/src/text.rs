//! Text preparation for PDF output: markdown residue removal, paragraph
//! splitting, date normalisation and word wrap.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

/// Paragraphs shorter than this are dropped by [`clean_and_split`].
pub const MIN_PARAGRAPH_CHARS: usize = 20;

fn label_patterns() -> &'static [Regex; 3] {
    static RE: OnceLock<[Regex; 3]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"\*\*Paragraph\s+\d+\s*-\s*[^:*]+:\*\*\s*").expect("valid regex"),
            Regex::new(r"Paragraph\s+\d+\s*-\s*[^:\n]+:\s*").expect("valid regex"),
            Regex::new(r"\*\*[^*\n]+:\*\*\s*").expect("valid regex"),
        ]
    })
}

/// Remove "Paragraph N - label:" markers, bold `**Header:**` labels and any
/// remaining `*`.
pub fn strip_markup(text: &str) -> String {
    let mut out = text.to_string();
    for re in label_patterns() {
        out = re.replace_all(&out, "").into_owned();
    }
    out.replace('*', "")
}

/// Clean `text` and split it into paragraphs on blank lines. Lines inside a
/// paragraph are joined with spaces; paragraphs of [`MIN_PARAGRAPH_CHARS`]
/// or fewer characters are dropped.
pub fn clean_and_split(text: &str) -> Vec<String> {
    let cleaned = strip_markup(text);
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let mut flush = |current: &mut Vec<&str>| {
        let p = current.join(" ");
        if p.chars().count() > MIN_PARAGRAPH_CHARS {
            paragraphs.push(p);
        }
        current.clear();
    };

    for line in cleaned.lines().map(str::trim) {
        if line.is_empty() {
            flush(&mut current);
        } else {
            current.push(line);
        }
    }
    flush(&mut current);
    paragraphs
}

/// Map characters the built-in PDF fonts cannot show to ASCII.
pub fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2022}' | '\u{00B7}' => '-',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\t' => ' ',
            c if c.is_ascii() => c,
            _ => '?',
        })
        .collect()
}

/// `YYYYMMDD` and common separated forms become `YYYY-MM-DD`; anything else
/// is returned unchanged, and a missing date is `Unknown`.
pub fn format_date(value: Option<&str>) -> String {
    let s = match value.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return "Unknown".to_string(),
    };
    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        return format!("{}-{}-{}", &s[0..4], &s[4..6], &s[6..8]);
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.format("%Y-%m-%d").to_string();
        }
    }
    s.to_string()
}

/// First `max` characters, with `...` appended when something was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Greedy word wrap by character budget. Words longer than the budget are
/// split. Always returns at least one line.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..max_chars).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup_removes_labels() {
        let text = "**Paragraph 1 - Normal Anatomy:** The **lungs** are clear.\n\
                    Paragraph 2 - Pathology: No mass.\n**Technique:** PA view";
        let out = strip_markup(text);
        assert_eq!(out, "The lungs are clear.\nNo mass.\nPA view");
    }

    #[test]
    fn test_clean_and_split_paragraphs() {
        let text = "**Paragraph 1 - Anatomy:** The lungs are clear bilaterally\nwith normal vascular markings.\n\n\n\
                    Too short.\n\n  The cardiac silhouette is within normal limits.  ";
        let paras = clean_and_split(text);
        assert_eq!(
            paras,
            vec![
                "The lungs are clear bilaterally with normal vascular markings.".to_string(),
                "The cardiac silhouette is within normal limits.".to_string(),
            ]
        );
        assert!(clean_and_split("").is_empty());
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(Some("20240309")), "2024-03-09");
        assert_eq!(format_date(Some("2024/03/09")), "2024-03-09");
        assert_eq!(format_date(Some("09/03/2024")), "2024-03-09");
        assert_eq!(format_date(Some("March 2024")), "March 2024");
        assert_eq!(format_date(Some("")), "Unknown");
        assert_eq!(format_date(None), "Unknown");
    }

    #[test]
    fn test_wrap_text_respects_budget() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");

        let long = wrap_text("abcdefghijkl", 5);
        assert_eq!(long, vec!["abcde", "fghij", "kl"]);
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }

    #[test]
    fn test_truncate_and_pdf_safe() {
        assert_eq!(truncate_chars("short.dcm", 20), "short.dcm");
        assert_eq!(truncate_chars("a_very_long_filename_for_a_study.dcm", 20), "a_very_long_filename...");
        assert_eq!(pdf_safe("\u{2022} lesion \u{2014} 5\u{00B5}m"), "- lesion - 5?m");
    }
}
