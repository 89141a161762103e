use std::fmt::Display;
use std::iter::FusedIterator;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug)]
pub struct File {
    name: String,
    contents: String,
    lines: Vec<usize>,
}

impl File {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let name = name.into();
        let contents = contents.into();
        let mut lines = vec![0];
        for (idx, ch) in contents.char_indices() {
            if ch == '\n' {
                lines.push(idx + ch.len_utf8());
            }
        }
        Self {
            name,
            contents,
            lines,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Text of the 1-based `line`, without its newline.
    pub fn line(&self, line: usize) -> &str {
        if line == 0 || line > self.lines.len() {
            return "";
        }
        let start = self.lines[line - 1];
        let end = if let Some(next_start) = self.lines.get(line) {
            let mut end = *next_start;
            if end > start && self.contents.as_bytes()[end - 1] == b'\n' {
                end -= 1;
            }
            end
        } else {
            self.contents.len()
        };
        &self.contents[start..end]
    }

    /// Renders `range` the way compilers do: `name:line:column`, the line,
    /// and a caret underline.
    pub fn snippet(&self, range: Range) -> String {
        let line_text = self.line(range.start.line);
        let width = if range.end.line == range.start.line {
            range.end.column.saturating_sub(range.start.column)
        } else {
            line_text
                .chars()
                .count()
                .saturating_sub(range.start.column - 1)
        };
        format!(
            "{}:{}:{}\n{}\n{}{}",
            self.name,
            range.start.line,
            range.start.column,
            line_text,
            " ".repeat(range.start.column.saturating_sub(1)),
            "^".repeat(std::cmp::max(1, width))
        )
    }
}

/// 1-based line and column. Every character, tabs included, is one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open source range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Range {
    pub start: Location,
    pub end: Location,
}

impl Range {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident,   // e.g. "foo", "x'"
    TypeVar, // e.g. "'a"
    NumLit,  // e.g. "0", "42"
    StrLit,  // e.g. "\"alice/nat@1\"", text holds the unescaped contents
    Keyword, // e.g. "apply", "Theorem"
    Symbol,  // e.g. "→", "(", "↦"
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub range: Range,
}

impl Token {
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_symbol(&self, sym: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == sym
    }

    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == kw
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?} {} at {}", self.kind, self.text, self.range.start)
    }
}

pub const KEYWORDS: &[&str] = &[
    "apply", "Theorem", "qed", "use", "import", "constant", "axiom",
];

#[derive(Debug, Clone, Error)]
#[error("{message} at {location}")]
pub struct LexError {
    pub message: String,
    pub location: Location,
    /// Every token scanned, error tokens included.
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone)]
pub struct Lex {
    file: Arc<File>,
    position: usize,
    location: Location,
}

impl Lex {
    pub fn new(file: Arc<File>) -> Self {
        Self {
            file,
            position: 0,
            location: Location::default(),
        }
    }

    pub fn input(&self) -> &Arc<File> {
        &self.file
    }

    /// Location just past the last consumed character.
    pub fn location(&self) -> Location {
        self.location
    }

    pub fn is_eof(&self) -> bool {
        self.clone().next().is_none()
    }

    fn advance(&mut self, bytes: usize) -> Range {
        let start = self.location;
        let end = self.position + bytes;
        for ch in self.file.contents()[self.position..end].chars() {
            if ch == '\n' {
                self.location.line += 1;
                self.location.column = 1;
            } else {
                self.location.column += 1;
            }
        }
        self.position = end;
        Range::new(start, self.location)
    }
}

fn canonical_symbol(text: &str) -> &str {
    match text {
        "->" => "→",
        "|-" => "⊢",
        "|->" => "↦",
        "/\\" => "∧",
        "\\/" => "∨",
        "\\" => "λ",
        _ => text,
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl Iterator for Lex {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        #[derive(PartialEq, Eq, Debug)]
        enum Kind {
            Space,
            TypeVar,
            Ident,
            NumLit,
            StrLit,
            Unterminated,
            Symbol,
        }

        static RE: Lazy<Regex> = Lazy::new(|| {
            let s = &[
                (Kind::Space, r"\s+|#[^\n]*"),
                (Kind::TypeVar, r"'[A-Za-z_][A-Za-z0-9_]*'*"),
                (Kind::Ident, r"[A-Za-z_][A-Za-z0-9_]*'*"),
                (Kind::NumLit, r"[0-9]+"),
                (Kind::StrLit, r#""(?:[^"\\\n]|\\.)*""#),
                (Kind::Unterminated, r#""(?:[^"\\\n]|\\.)*"#),
                (
                    Kind::Symbol,
                    r"\|->|\|-|->|/\\|\\/|[λ\\.,(){}⊤⊥∧∨→∀∃⊢:↦]",
                ),
            ]
            .iter()
            .map(|(kind, re)| format!("(?P<{:?}>{})", kind, re))
            .collect::<Vec<_>>()
            .join("|");
            regex::Regex::new(&format!("^(?:{})", s)).unwrap()
        });

        loop {
            if self.file.len() == self.position {
                return None;
            }
            let input = Arc::clone(&self.file);
            let rest = &input.contents()[self.position..];
            let cap = match RE.captures(rest) {
                None => {
                    let ch = rest.chars().next()?;
                    let range = self.advance(ch.len_utf8());
                    return Some(Token {
                        kind: TokenKind::Error(format!("unrecognized character '{ch}'")),
                        text: ch.to_string(),
                        range,
                    });
                }
                Some(cap) => cap,
            };

            // skip whitespaces and comments
            if let Some(m) = cap.name(&format!("{:?}", Kind::Space)) {
                self.advance(m.len());
                continue;
            }

            let m = cap.get(0)?;
            let text = m.as_str();
            let range = self.advance(m.len());

            let (kind, text) = if cap.name(&format!("{:?}", Kind::Ident)).is_some() {
                if KEYWORDS.contains(&text) {
                    (TokenKind::Keyword, text.to_owned())
                } else {
                    (TokenKind::Ident, text.to_owned())
                }
            } else if cap.name(&format!("{:?}", Kind::TypeVar)).is_some() {
                (TokenKind::TypeVar, text[1..].to_owned())
            } else if cap.name(&format!("{:?}", Kind::NumLit)).is_some() {
                (TokenKind::NumLit, text.to_owned())
            } else if cap.name(&format!("{:?}", Kind::StrLit)).is_some() {
                (TokenKind::StrLit, unescape(&text[1..text.len() - 1]))
            } else if cap.name(&format!("{:?}", Kind::Unterminated)).is_some() {
                (
                    TokenKind::Error("unterminated string literal".to_owned()),
                    text.to_owned(),
                )
            } else {
                (TokenKind::Symbol, canonical_symbol(text).to_owned())
            };
            return Some(Token { kind, text, range });
        }
    }
}

impl FusedIterator for Lex {}

/// Scans the whole input. Fails with the first error token, but the error
/// still carries every token so that partial results can be shown.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    let file = Arc::new(File::new("<input>", text));
    let tokens = Lex::new(file).collect::<Vec<_>>();
    let first_error = tokens.iter().find_map(|token| match &token.kind {
        TokenKind::Error(message) => Some((message.clone(), token.range.start)),
        _ => None,
    });
    match first_error {
        None => Ok(tokens),
        Some((message, location)) => Err(LexError {
            message,
            location,
            tokens,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_texts(input: &str) -> Vec<(TokenKind, String)> {
        tokenize(input)
            .expect("lexing failed")
            .into_iter()
            .map(|token| (token.kind, token.text))
            .collect()
    }

    #[test]
    fn keywords_idents_and_symbols() {
        let tokens = kinds_and_texts("Theorem id P → P");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "Theorem".to_owned()),
                (TokenKind::Ident, "id".to_owned()),
                (TokenKind::Ident, "P".to_owned()),
                (TokenKind::Symbol, "→".to_owned()),
                (TokenKind::Ident, "P".to_owned()),
            ]
        );
    }

    #[test]
    fn ident_with_apostrophe() {
        let tokens = kinds_and_texts("x'");
        assert_eq!(tokens, vec![(TokenKind::Ident, "x'".to_owned())]);
    }

    #[test]
    fn type_variable() {
        let tokens = kinds_and_texts("'a → 'b");
        assert_eq!(tokens[0], (TokenKind::TypeVar, "a".to_owned()));
        assert_eq!(tokens[2], (TokenKind::TypeVar, "b".to_owned()));
    }

    #[test]
    fn ascii_spellings_are_canonicalized() {
        let tokens = kinds_and_texts(r"\x. A /\ B \/ C -> D |- E |->");
        let symbols = tokens
            .into_iter()
            .filter(|(kind, _)| *kind == TokenKind::Symbol)
            .map(|(_, text)| text)
            .collect::<Vec<_>>();
        assert_eq!(symbols, vec!["λ", ".", "∧", "∨", "→", "⊢", "↦"]);
    }

    #[test]
    fn comments_and_strings() {
        let tokens = kinds_and_texts("import \"alice/nat@1\" # trailing\n# whole line\nqed");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "import".to_owned()),
                (TokenKind::StrLit, "alice/nat@1".to_owned()),
                (TokenKind::Keyword, "qed".to_owned()),
            ]
        );
    }

    #[test]
    fn locations_count_tabs_as_one_column() {
        let tokens = tokenize("qed\n\tapply  I").expect("lexing failed");
        assert_eq!(tokens[0].range, Range::new(Location::new(1, 1), Location::new(1, 4)));
        assert_eq!(tokens[1].range, Range::new(Location::new(2, 2), Location::new(2, 7)));
        assert_eq!(tokens[2].range, Range::new(Location::new(2, 9), Location::new(2, 10)));
    }

    #[test]
    fn unicode_columns_count_characters() {
        let tokens = tokenize("∀x. ⊤").expect("lexing failed");
        assert_eq!(tokens[1].range.start, Location::new(1, 2));
        assert_eq!(tokens[3].range.start, Location::new(1, 5));
    }

    #[test]
    fn unrecognized_character_yields_error_token() {
        let err = tokenize("qed $ qed").unwrap_err();
        assert_eq!(err.location, Location::new(1, 5));
        assert!(err.message.contains("unrecognized character"));
        // scanning continues past the error
        assert_eq!(err.tokens.len(), 3);
        assert_eq!(err.tokens[2].text, "qed");
    }

    #[test]
    fn unterminated_string() {
        let err = tokenize("import \"alice").unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!(err.location, Location::new(1, 8));
    }

    #[test]
    fn snippet_points_at_range() {
        let file = File::new("demo.seq", "Theorem t P\napply Foo\n");
        let range = Range::new(Location::new(2, 7), Location::new(2, 10));
        assert_eq!(file.snippet(range), "demo.seq:2:7\napply Foo\n      ^^^");
    }
}
