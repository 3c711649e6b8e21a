//! Skip/grep filtering of raw file content.
//!
//! Two independent stages: the skip pattern removes matched byte ranges
//! from the raw delta before line-splitting, the grep pattern then retains
//! only matching lines. Both are compiled once at startup and shared.

use std::borrow::Cow;

use regex::bytes::Regex;

/// Compiled filter patterns.
///
/// Both patterns operate on bytes (file content is not assumed to be valid
/// UTF-8 until a line is actually sent) and are compiled in multi-line
/// mode, so `^`/`$` anchor at line boundaries within a delta.
#[derive(Debug, Default)]
pub struct Patterns {
    skip: Option<Regex>,
    grep: Option<Regex>,
}

impl Patterns {
    /// Compiles the skip and grep patterns.
    ///
    /// An absent or empty pattern disables that stage; a disabled grep
    /// stage retains every line.
    pub fn new(skip: Option<&str>, grep: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            skip: compile(skip)?,
            grep: compile(grep)?,
        })
    }

    /// Removes every skip-pattern match from the raw bytes.
    ///
    /// Runs before line-splitting, so a pattern may span or remove line
    /// boundaries. Without a skip pattern the input passes through
    /// unchanged and uncopied.
    pub fn strip<'a>(&self, bytes: &'a [u8]) -> Cow<'a, [u8]> {
        match &self.skip {
            Some(re) => re.replace_all(bytes, &b""[..]),
            None => Cow::Borrowed(bytes),
        }
    }

    /// Whether a single line passes the grep stage.
    pub fn matches(&self, line: &[u8]) -> bool {
        match &self.grep {
            Some(re) => re.is_match(line),
            None => true,
        }
    }

    /// Splits a delta into lines and retains grep matches, in file order.
    ///
    /// One trailing newline is trimmed first so a buffer ending in `\n`
    /// does not yield a spurious empty final line.
    pub fn filter_lines<'a>(&self, bytes: &'a [u8]) -> Vec<&'a [u8]> {
        let trimmed = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        trimmed
            .split(|&b| b == b'\n')
            .filter(|line| self.matches(line))
            .collect()
    }
}

/// Compiles a pattern in multi-line mode, treating empty as absent.
fn compile(pattern: Option<&str>) -> Result<Option<Regex>, regex::Error> {
    match pattern {
        Some(p) if !p.is_empty() => Ok(Some(Regex::new(&format!("(?m){p}"))?)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grep_retains_matching_lines_in_order() {
        let patterns = Patterns::new(None, Some("a")).unwrap();
        let lines = patterns.filter_lines(b"a\nb\nab\n");
        assert_eq!(lines, vec![&b"a"[..], &b"ab"[..]]);
    }

    #[test]
    fn no_grep_retains_everything() {
        let patterns = Patterns::new(None, None).unwrap();
        let lines = patterns.filter_lines(b"x\ny\n");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn empty_grep_retains_everything() {
        let patterns = Patterns::new(None, Some("")).unwrap();
        assert!(patterns.matches(b"anything"));
    }

    #[test]
    fn dot_star_matches_every_line() {
        let patterns = Patterns::new(None, Some(".*")).unwrap();
        let lines = patterns.filter_lines(b"one\n\ntwo\n");
        assert_eq!(lines, vec![&b"one"[..], &b""[..], &b"two"[..]]);
    }

    #[test]
    fn trailing_newline_trimmed_once() {
        let patterns = Patterns::new(None, None).unwrap();
        // Two trailing newlines: only one is trimmed, leaving an empty line.
        let lines = patterns.filter_lines(b"a\n\n");
        assert_eq!(lines, vec![&b"a"[..], &b""[..]]);
    }

    #[test]
    fn buffer_without_newline_is_one_line() {
        let patterns = Patterns::new(None, None).unwrap();
        let lines = patterns.filter_lines(b"partial");
        assert_eq!(lines, vec![&b"partial"[..]]);
    }

    #[test]
    fn skip_strips_prefix_without_moving_line_boundaries() {
        let patterns = Patterns::new(Some("^PREFIX"), None).unwrap();
        let stripped = patterns.strip(b"PREFIXline1\nline2\n");
        let lines = patterns.filter_lines(&stripped);
        assert_eq!(lines, vec![&b"line1"[..], &b"line2"[..]]);
    }

    #[test]
    fn skip_is_multi_line() {
        // ^ anchors at every line start, so a leading-junk pattern
        // applies to each line of the delta.
        let patterns = Patterns::new(Some("^[^{]*"), None).unwrap();
        let stripped = patterns.strip(b"ts1 {\"a\":1}\nts2 {\"b\":2}\n");
        assert_eq!(&stripped[..], b"{\"a\":1}\n{\"b\":2}\n");
    }

    #[test]
    fn no_skip_passes_through_borrowed() {
        let patterns = Patterns::new(None, None).unwrap();
        let input = b"unchanged";
        assert!(matches!(patterns.strip(input), Cow::Borrowed(_)));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(Patterns::new(Some("("), None).is_err());
        assert!(Patterns::new(None, Some("[")).is_err());
    }

    #[test]
    fn skip_and_grep_compose() {
        let patterns = Patterns::new(Some("^DEBUG "), Some("error")).unwrap();
        let stripped = patterns.strip(b"DEBUG error in worker\nDEBUG all fine\n");
        let lines = patterns.filter_lines(&stripped);
        assert_eq!(lines, vec![&b"error in worker"[..]]);
    }
}
