//! Dynamic string stripping
//!
//! Some string literals in served scripts are filled in per request and can
//! never match a published hash. The build marks each of them with a
//! preceding `/*BTDS*/` comment; their contents are emptied before hashing.
//!
//! The source is walked as a token stream and every string literal is handed
//! to a [`LiteralVisitor`] together with the comment directly before it.

use std::iter::Peekable;
use std::ops::Range;
use std::str::CharIndices;

/// Comment marking a dynamic string literal
pub const DYNAMIC_STRING_MARKER: &str = "/*BTDS*/";

/// Callback for string literals found in a script
pub trait LiteralVisitor {
    /// `span` covers the literal including its quotes; `comment` is the block
    /// comment immediately before it, separated by whitespace at most.
    fn visit_string_literal(&mut self, span: Range<usize>, comment: Option<&str>);
}

/// Words after which a `/` starts a regular expression
const REGEX_PRECEDING_WORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

struct Scanner<'src> {
    source: &'src str,
    chars: Peekable<CharIndices<'src>>,
    /// Last block comment, cleared by any token
    comment: Option<Range<usize>>,
    /// Whether a `/` at this point would begin a regex literal
    expect_operand: bool,
}

impl<'src> Scanner<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            comment: None,
            expect_operand: true,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, c)| c)
    }

    fn pos(&mut self) -> usize {
        self.chars.peek().map_or(self.source.len(), |&(i, _)| i)
    }

    fn advance(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn walk(&mut self, visitor: &mut impl LiteralVisitor) {
        while let Some(c) = self.peek() {
            let start = self.pos();
            match c {
                c if c.is_whitespace() => {
                    self.advance();
                }
                '/' if self.peek_next() == Some('/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                    self.comment = None;
                }
                '/' if self.peek_next() == Some('*') => {
                    self.skip_block_comment();
                    let end = self.pos();
                    self.comment = Some(start..end);
                }
                '\'' | '"' => {
                    self.skip_string(c);
                    let end = self.pos();
                    let source = self.source;
                    let comment = self.comment.take().map(|r| &source[r]);
                    visitor.visit_string_literal(start..end, comment);
                    self.expect_operand = false;
                }
                '`' => {
                    self.skip_template();
                    self.token(false);
                }
                '/' if self.expect_operand => {
                    self.skip_regex();
                    self.token(false);
                }
                c if c.is_alphanumeric() || c == '_' || c == '$' => {
                    while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                        self.advance();
                    }
                    let end = self.pos();
                    let word = &self.source[start..end];
                    let keyword = REGEX_PRECEDING_WORDS.contains(&word);
                    self.token(keyword);
                }
                ')' | ']' | '}' => {
                    self.advance();
                    self.token(false);
                }
                _ => {
                    self.advance();
                    self.token(true);
                }
            }
        }
    }

    fn token(&mut self, expect_operand: bool) {
        self.comment = None;
        self.expect_operand = expect_operand;
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // /
        self.advance(); // *
        while let Some(c) = self.advance() {
            if c == '*' && self.peek() == Some('/') {
                self.advance();
                break;
            }
        }
    }

    fn skip_string(&mut self, quote: char) {
        self.advance();
        while let Some(c) = self.advance() {
            match c {
                '\\' => {
                    self.advance();
                }
                '\n' => break,
                c if c == quote => break,
                _ => {}
            }
        }
    }

    fn skip_template(&mut self) {
        self.advance();
        let mut depth = 0usize;
        while let Some(c) = self.advance() {
            match c {
                '\\' => {
                    self.advance();
                }
                '$' if depth == 0 && self.peek() == Some('{') => {
                    self.advance();
                    depth = 1;
                }
                '{' if depth > 0 => depth += 1,
                '}' if depth > 0 => depth -= 1,
                '`' if depth == 0 => break,
                _ => {}
            }
        }
    }

    fn skip_regex(&mut self) {
        self.advance();
        let mut in_class = false;
        while let Some(c) = self.advance() {
            match c {
                '\\' => {
                    self.advance();
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => break,
                '\n' => return,
                _ => {}
            }
        }
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance();
        }
    }
}

/// Walk every string literal in `source`.
pub fn walk_string_literals(source: &str, visitor: &mut impl LiteralVisitor) {
    Scanner::new(source).walk(visitor);
}

#[derive(Default)]
struct DynamicStrings {
    spans: Vec<Range<usize>>,
}

impl LiteralVisitor for DynamicStrings {
    fn visit_string_literal(&mut self, span: Range<usize>, comment: Option<&str>) {
        if comment == Some(DYNAMIC_STRING_MARKER) {
            self.spans.push(span);
        }
    }
}

/// Empty every string literal marked as dynamic, keeping its quotes.
pub fn strip_dynamic_strings(source: &str) -> String {
    let mut found = DynamicStrings::default();
    walk_string_literals(source, &mut found);
    if found.spans.is_empty() {
        return source.to_string();
    }

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for span in found.spans {
        let quote = &source[span.start..span.start + 1];
        out.push_str(&source[last..span.start]);
        out.push_str(quote);
        out.push_str(quote);
        last = span.end;
    }
    out.push_str(&source[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marked_literal_emptied() {
        assert_eq!(
            strip_dynamic_strings(r#"var a=/*BTDS*/"user-123",b="static";"#),
            r#"var a=/*BTDS*/"",b="static";"#
        );
    }

    #[test]
    fn test_whitespace_between_marker_and_literal() {
        assert_eq!(strip_dynamic_strings("f(/*BTDS*/ 'x\\'y')"), "f(/*BTDS*/ '')");
    }

    #[test]
    fn test_marker_must_directly_precede() {
        let src = r#"/*BTDS*/ x = "kept""#;
        assert_eq!(strip_dynamic_strings(src), src);
    }

    #[test]
    fn test_other_comments_ignored() {
        let src = r#"a(/*note*/"kept")"#;
        assert_eq!(strip_dynamic_strings(src), src);
    }

    #[test]
    fn test_marker_inside_string_or_regex_is_not_a_comment() {
        let src = r#"a = "/*BTDS*/"; b = "kept"; c = /\/*BTDS*\//g; d = "kept""#;
        assert_eq!(strip_dynamic_strings(src), src);
    }

    #[test]
    fn test_template_literals_are_opaque() {
        let src = "a = `${ \"x\" }`; b = /*BTDS*/'y'";
        assert_eq!(strip_dynamic_strings(src), "a = `${ \"x\" }`; b = /*BTDS*/''");
    }

    #[test]
    fn test_division_is_not_regex() {
        let src = r#"x = a / b; y = /*BTDS*/"z"; w = c / d"#;
        assert_eq!(strip_dynamic_strings(src), r#"x = a / b; y = /*BTDS*/""; w = c / d"#);
    }

    #[test]
    fn test_visitor_sees_all_literals() {
        struct Collect(Vec<String>);
        impl LiteralVisitor for Collect {
            fn visit_string_literal(&mut self, span: Range<usize>, _comment: Option<&str>) {
                self.0.push(span.len().to_string());
            }
        }
        let mut c = Collect(Vec::new());
        walk_string_literals(r#"'a' + "bb" // 'ignored'"#, &mut c);
        assert_eq!(c.0, vec!["3", "4"]);
    }

    #[test]
    fn test_unmarked_source_unchanged() {
        let src = "function f(){return 1}";
        assert_eq!(strip_dynamic_strings(src), src);
    }
}
