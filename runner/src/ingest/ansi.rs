use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// CSI sequences, both the 7-bit `ESC [` and the 8-bit `0x9B` introducer
static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\x{9B}|\x1B\[)[0-?]*[ -/]*[@-~]").expect("valid escape pattern"));

/// Remove terminal escape sequences from a line of benchmark output
///
/// Only the escape bytes are dropped, everything in between is kept as is. Lines without any
/// escape sequence are returned without allocating.
pub fn strip(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}
