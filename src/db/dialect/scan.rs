//! Literal-aware SQL scanner used for placeholder and row-limit rewriting.
//!
//! Unlike the classifier's tokenizer, this scanner keeps byte spans into the
//! original text so rewrites can splice replacements without touching
//! anything else. Whitespace and comments are skipped; string literals,
//! quoted identifiers, dollar quotes and Oracle `q'[...]'` quotes are single
//! opaque lexemes.

use crate::models::DatabaseType;
use thiserror::Error;

/// Engine-specific lexical rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanRules {
    backslash_escapes: bool,
    double_quoted_strings: bool,
    hash_comments: bool,
    /// MySQL only treats `--` as a comment when followed by whitespace.
    dash_comment_needs_space: bool,
    backticks: bool,
    dollar_quotes: bool,
    nested_comments: bool,
    q_quotes: bool,
    colon_binds: bool,
    question_placeholders: bool,
    dollar_placeholders: bool,
}

impl ScanRules {
    pub(crate) fn for_engine(engine: DatabaseType) -> Self {
        match engine {
            DatabaseType::PostgreSQL => Self {
                backslash_escapes: false,
                double_quoted_strings: false,
                hash_comments: false,
                dash_comment_needs_space: false,
                backticks: false,
                dollar_quotes: true,
                nested_comments: true,
                q_quotes: false,
                colon_binds: false,
                question_placeholders: false,
                dollar_placeholders: true,
            },
            DatabaseType::MySQL => Self {
                backslash_escapes: true,
                double_quoted_strings: true,
                hash_comments: true,
                dash_comment_needs_space: true,
                backticks: true,
                dollar_quotes: false,
                nested_comments: false,
                q_quotes: false,
                colon_binds: false,
                question_placeholders: true,
                dollar_placeholders: false,
            },
            DatabaseType::Oracle => Self {
                backslash_escapes: false,
                double_quoted_strings: false,
                hash_comments: false,
                dash_comment_needs_space: false,
                backticks: false,
                dollar_quotes: false,
                nested_comments: false,
                q_quotes: true,
                colon_binds: true,
                question_placeholders: false,
                dollar_placeholders: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LexKind {
    Word,
    Number,
    /// String literal or quoted identifier.
    Quoted,
    /// `%(name)s`
    Canonical(String),
    /// `:name` (Oracle)
    Bind(String),
    /// `$1`, `?` or `:1`
    NativePositional,
    LParen,
    RParen,
    Comma,
    Semi,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Lexeme {
    pub kind: LexKind,
    pub start: usize,
    pub end: usize,
    /// Parenthesis depth; `(` and `)` carry the outer depth.
    pub depth: usize,
}

impl Lexeme {
    pub(crate) fn text<'a>(&self, sql: &'a str) -> &'a str {
        &sql[self.start..self.end]
    }

    pub(crate) fn is_word(&self, sql: &str, word: &str) -> bool {
        self.kind == LexKind::Word && self.text(sql).eq_ignore_ascii_case(word)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ScanError {
    #[error("unterminated {what} starting at byte {at}")]
    Unterminated { what: &'static str, at: usize },
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80
}

/// Scan `sql` into lexemes.
pub(crate) fn scan(sql: &str, rules: ScanRules) -> Result<Vec<Lexeme>, ScanError> {
    let b = sql.as_bytes();
    let n = b.len();
    let at = |i: usize| b.get(i).copied().unwrap_or(0);
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < n {
        let start = i;
        let c = b[i];
        let kind = match c {
            c if c.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            b'-' if at(i + 1) == b'-'
                && (!rules.dash_comment_needs_space
                    || i + 2 >= n
                    || at(i + 2).is_ascii_whitespace()) =>
            {
                i = line_end(b, i);
                continue;
            }
            b'#' if rules.hash_comments => {
                i = line_end(b, i);
                continue;
            }
            b'/' if at(i + 1) == b'*' => {
                i = block_comment_end(b, i, rules.nested_comments)?;
                continue;
            }
            b'\'' => {
                i = quoted_end(b, i, b'\'', rules.backslash_escapes, "string literal")?;
                LexKind::Quoted
            }
            b'"' => {
                let escapes = rules.backslash_escapes && rules.double_quoted_strings;
                i = quoted_end(b, i, b'"', escapes, "quoted identifier")?;
                LexKind::Quoted
            }
            b'`' if rules.backticks => {
                i = quoted_end(b, i, b'`', false, "quoted identifier")?;
                LexKind::Quoted
            }
            b'$' if rules.dollar_placeholders && at(i + 1).is_ascii_digit() => {
                i += 1;
                while at(i).is_ascii_digit() {
                    i += 1;
                }
                LexKind::NativePositional
            }
            b'$' if rules.dollar_quotes && dollar_tag_end(b, i).is_some() => {
                let tag_end = dollar_tag_end(b, i).unwrap_or(i);
                let tag = &sql[i..=tag_end];
                match sql[tag_end + 1..].find(tag) {
                    Some(pos) => i = tag_end + 1 + pos + tag.len(),
                    None => {
                        return Err(ScanError::Unterminated {
                            what: "dollar-quoted string",
                            at: start,
                        });
                    }
                }
                LexKind::Quoted
            }
            b'?' if rules.question_placeholders => {
                i += 1;
                LexKind::NativePositional
            }
            b'%' if at(i + 1) == b'(' => match canonical_end(b, i) {
                Some(close) => {
                    i = close + 2;
                    LexKind::Canonical(sql[start + 2..close].to_string())
                }
                None => {
                    i += 1;
                    LexKind::Punct
                }
            },
            b':' if rules.colon_binds && is_ident_start(at(i + 1)) => {
                i += 1;
                while is_ident_char(at(i)) || at(i) == b'#' {
                    i += 1;
                }
                LexKind::Bind(sql[start + 1..i].to_string())
            }
            b':' if rules.colon_binds && at(i + 1).is_ascii_digit() => {
                i += 1;
                while at(i).is_ascii_digit() {
                    i += 1;
                }
                LexKind::NativePositional
            }
            b'(' => {
                i += 1;
                depth += 1;
                out.push(Lexeme {
                    kind: LexKind::LParen,
                    start,
                    end: i,
                    depth: depth - 1,
                });
                continue;
            }
            b')' => {
                i += 1;
                depth = depth.saturating_sub(1);
                LexKind::RParen
            }
            b',' => {
                i += 1;
                LexKind::Comma
            }
            b';' => {
                i += 1;
                LexKind::Semi
            }
            c if c.is_ascii_digit() || (c == b'.' && at(i + 1).is_ascii_digit()) => {
                i += 1;
                while at(i).is_ascii_alphanumeric()
                    || at(i) == b'.'
                    || at(i) == b'_'
                    || (matches!(at(i), b'+' | b'-') && matches!(at(i - 1), b'e' | b'E'))
                {
                    i += 1;
                }
                LexKind::Number
            }
            c if is_ident_start(c) => {
                i += 1;
                while is_ident_char(at(i)) || (rules.q_quotes && at(i) == b'#') {
                    i += 1;
                }
                if at(i) == b'\'' {
                    let prefix = &sql[start..i];
                    if rules.q_quotes
                        && (prefix.eq_ignore_ascii_case("q") || prefix.eq_ignore_ascii_case("nq"))
                    {
                        i = q_quote_end(b, i, start)?;
                        out.push(Lexeme {
                            kind: LexKind::Quoted,
                            start,
                            end: i,
                            depth,
                        });
                        continue;
                    }
                    let escape_string = rules.dollar_quotes && prefix.eq_ignore_ascii_case("e");
                    if escape_string || matches!(prefix.to_ascii_uppercase().as_str(), "N" | "B" | "X")
                    {
                        let escapes = rules.backslash_escapes || escape_string;
                        i = quoted_end(b, i, b'\'', escapes, "string literal")?;
                        LexKind::Quoted
                    } else {
                        LexKind::Word
                    }
                } else {
                    LexKind::Word
                }
            }
            _ => {
                i += utf8_width(c);
                LexKind::Punct
            }
        };
        out.push(Lexeme {
            kind,
            start,
            end: i,
            depth,
        });
    }
    Ok(out)
}

fn utf8_width(c: u8) -> usize {
    match c {
        0xF0..=0xFF => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

fn line_end(b: &[u8], from: usize) -> usize {
    b[from..]
        .iter()
        .position(|&c| c == b'\n')
        .map(|p| from + p + 1)
        .unwrap_or(b.len())
}

fn block_comment_end(b: &[u8], from: usize, nested: bool) -> Result<usize, ScanError> {
    let mut level = 0usize;
    let mut i = from;
    while i + 1 < b.len() {
        if b[i] == b'/' && b[i + 1] == b'*' {
            level = if nested { level + 1 } else { 1 };
            i += 2;
        } else if b[i] == b'*' && b[i + 1] == b'/' {
            level -= 1;
            i += 2;
            if level == 0 {
                return Ok(i);
            }
        } else {
            i += 1;
        }
    }
    Err(ScanError::Unterminated {
        what: "block comment",
        at: from,
    })
}

/// Index just past the closing quote; doubled quotes are escapes.
fn quoted_end(
    b: &[u8],
    open: usize,
    quote: u8,
    backslash: bool,
    what: &'static str,
) -> Result<usize, ScanError> {
    let mut i = open + 1;
    while i < b.len() {
        let c = b[i];
        if backslash && c == b'\\' {
            i += 2;
            continue;
        }
        if c == quote {
            if b.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(ScanError::Unterminated { what, at: open })
}

/// `$$` or `$tag$` starting at `i`; returns the index of the closing `$`.
fn dollar_tag_end(b: &[u8], i: usize) -> Option<usize> {
    let mut j = i + 1;
    if b.get(j) == Some(&b'$') {
        return Some(j);
    }
    if !b.get(j).is_some_and(|&c| is_ident_start(c)) {
        return None;
    }
    while b.get(j).is_some_and(|&c| c.is_ascii_alphanumeric() || c == b'_' || c >= 0x80) {
        j += 1;
    }
    (b.get(j) == Some(&b'$')).then_some(j)
}

/// `%(name)s` starting at `i`; returns the index of `)`.
fn canonical_end(b: &[u8], i: usize) -> Option<usize> {
    let name_start = i + 2;
    if !b.get(name_start).is_some_and(|&c| c.is_ascii_alphabetic() || c == b'_') {
        return None;
    }
    let mut j = name_start;
    while b.get(j).is_some_and(|&c| c.is_ascii_alphanumeric() || c == b'_') {
        j += 1;
    }
    (b.get(j) == Some(&b')') && b.get(j + 1) == Some(&b's')).then_some(j)
}

/// Oracle alternative quoting: `q'[...]'`, `q'{...}'`, `q'!...!'`.
fn q_quote_end(b: &[u8], quote: usize, start: usize) -> Result<usize, ScanError> {
    let err = ScanError::Unterminated {
        what: "q-quoted string",
        at: start,
    };
    let open = *b.get(quote + 1).ok_or(err.clone())?;
    let close = match open {
        b'[' => b']',
        b'(' => b')',
        b'{' => b'}',
        b'<' => b'>',
        other => other,
    };
    let mut i = quote + 2;
    while i + 1 < b.len() {
        if b[i] == close && b[i + 1] == b'\'' {
            return Ok(i + 2);
        }
        i += 1;
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str, engine: DatabaseType) -> Vec<LexKind> {
        scan(sql, ScanRules::for_engine(engine))
            .unwrap()
            .into_iter()
            .map(|l| l.kind)
            .collect()
    }

    #[test]
    fn test_placeholders_inside_literals_are_opaque() {
        let k = kinds(
            "SELECT '%(a)s', \"%(b)s\" FROM t -- %(c)s\nWHERE x = %(d)s",
            DatabaseType::PostgreSQL,
        );
        let names: Vec<_> = k
            .iter()
            .filter_map(|k| match k {
                LexKind::Canonical(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["d"]);
    }

    #[test]
    fn test_postgres_dollar_quotes_and_positionals() {
        let k = kinds("SELECT $q$ it's %(x)s $q$, $1", DatabaseType::PostgreSQL);
        assert_eq!(
            k,
            vec![
                LexKind::Word,
                LexKind::Quoted,
                LexKind::Comma,
                LexKind::NativePositional
            ]
        );
    }

    #[test]
    fn test_postgres_escape_string() {
        let k = kinds(r"SELECT E'it\'s', 1", DatabaseType::PostgreSQL);
        assert_eq!(k[1], LexKind::Quoted);
        assert_eq!(k.len(), 4);
    }

    #[test]
    fn test_mysql_rules() {
        let k = kinds(
            "SELECT `a`, 'it\\'s', \"x\" # comment %(y)s\n FROM t WHERE id = ?",
            DatabaseType::MySQL,
        );
        assert_eq!(k.last(), Some(&LexKind::NativePositional));
        assert!(!k.iter().any(|k| matches!(k, LexKind::Canonical(_))));
    }

    #[test]
    fn test_oracle_q_quotes_and_binds() {
        let k = kinds(
            "SELECT q'[it's :fake]' FROM dual WHERE a = :real AND b = :1",
            DatabaseType::Oracle,
        );
        assert!(k.contains(&LexKind::Bind("real".into())));
        assert!(!k.contains(&LexKind::Bind("fake".into())));
        assert!(k.contains(&LexKind::NativePositional));
    }

    #[test]
    fn test_postgres_cast_is_not_a_bind() {
        let k = kinds("SELECT x::int FROM t", DatabaseType::PostgreSQL);
        assert!(!k.iter().any(|k| matches!(k, LexKind::Bind(_))));
    }

    #[test]
    fn test_depth_tracking() {
        let lex = scan("SELECT (a, (b)) x", ScanRules::for_engine(DatabaseType::MySQL)).unwrap();
        let x = lex.last().unwrap();
        assert_eq!(x.depth, 0);
        assert_eq!(lex[4].kind, LexKind::LParen);
        assert_eq!(lex[4].depth, 1);
        assert_eq!(lex[5].depth, 2);
    }

    #[test]
    fn test_unterminated() {
        let rules = ScanRules::for_engine(DatabaseType::PostgreSQL);
        assert!(scan("SELECT 'abc", rules).is_err());
        assert!(scan("SELECT 1 /* open", rules).is_err());
        assert!(scan("SELECT $$ body", rules).is_err());
    }

    #[test]
    fn test_nested_comments_postgres() {
        let k = kinds("SELECT /* a /* b */ c */ 1", DatabaseType::PostgreSQL);
        assert_eq!(k, vec![LexKind::Word, LexKind::Number]);
    }
}
