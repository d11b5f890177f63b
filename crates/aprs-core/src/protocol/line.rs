//! Line trimming, termination, and server-comment detection.

/// Terminator appended to every line the client sends.
pub const LINE_TERMINATOR: &str = "\r\n";

/// First character of server-generated lines (banner, logresp, keepalive).
pub const COMMENT_MARKER: char = '#';

const LINE_ENDING: &[char] = &[' ', '\n', '\r'];

/// Strips trailing spaces, CR, and LF.
///
/// ```rust
/// use aprs_core::protocol::rtrim;
///
/// assert_eq!(rtrim("# aprsc 2.1.4\r\n"), "# aprsc 2.1.4");
/// ```
pub fn rtrim(line: &str) -> &str {
    line.trim_end_matches(LINE_ENDING)
}

/// Returns `true` for lines the server sends on its own behalf.
///
/// The check is purely lexical: any line whose first character is `#` is
/// treated as a comment.
pub fn is_server_comment(line: &str) -> bool {
    line.starts_with(COMMENT_MARKER)
}

/// Returns `text` with a CR LF terminator, adding one only when the text does
/// not already end in LF.
pub fn terminate(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}{LINE_TERMINATOR}")
    }
}
