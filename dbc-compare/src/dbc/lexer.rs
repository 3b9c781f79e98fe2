//! DBC section splitter
//!
//! Splits raw DBC text into one [`Record`] per keyword line. Continuation lines
//! (multi-line comments, value tables wrapped over several lines, the `NS_`
//! symbol block) are folded into the record they belong to. Lines that belong
//! to no record are skipped and remembered in [`Lexer::skipped_lines`].

use std::iter::Enumerate;
use std::str::Lines;

/// DBC section keyword
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    /// `VERSION`
    Version,
    /// `NS_` new-symbols block
    Ns,
    /// `BS_` bit timing
    Bs,
    /// `BU_` node list
    Bu,
    /// `BO_` message declaration
    Bo,
    /// `SG_` signal declaration
    Sg,
    /// `BO_TX_BU_` additional transmitters
    BoTxBu,
    /// `CM_` comment
    Cm,
    /// `BA_DEF_` attribute definition
    BaDef,
    /// `BA_DEF_DEF_` attribute default
    BaDefDef,
    /// `BA_` attribute value
    Ba,
    /// `VAL_` value descriptions
    Val,
    /// `VAL_TABLE_` named value table
    ValTable,
    /// `SIG_VALTYPE_` extended value type
    SigValType,
    /// Any other upper-case section keyword (vendor or rarely used sections)
    Other(String),
}

impl Keyword {
    /// Recognize a section keyword from the leading word of a line
    pub fn from_word(word: &str) -> Option<Keyword> {
        let keyword = match word {
            "VERSION" => Keyword::Version,
            "NS_" => Keyword::Ns,
            "BS_" => Keyword::Bs,
            "BU_" => Keyword::Bu,
            "BO_" => Keyword::Bo,
            "SG_" => Keyword::Sg,
            "BO_TX_BU_" => Keyword::BoTxBu,
            "CM_" => Keyword::Cm,
            "BA_DEF_" => Keyword::BaDef,
            "BA_DEF_DEF_" => Keyword::BaDefDef,
            "BA_" => Keyword::Ba,
            "VAL_" => Keyword::Val,
            "VAL_TABLE_" => Keyword::ValTable,
            "SIG_VALTYPE_" => Keyword::SigValType,
            other if is_section_word(other) => Keyword::Other(other.to_string()),
            _ => return None,
        };
        Some(keyword)
    }

    /// Sections that only end at a `;`
    fn needs_terminator(&self) -> bool {
        matches!(
            self,
            Keyword::Cm
                | Keyword::BaDef
                | Keyword::BaDefDef
                | Keyword::Ba
                | Keyword::Val
                | Keyword::ValTable
                | Keyword::BoTxBu
                | Keyword::SigValType
        )
    }

    /// Keyword as written in the file
    pub fn as_str(&self) -> &str {
        match self {
            Keyword::Version => "VERSION",
            Keyword::Ns => "NS_",
            Keyword::Bs => "BS_",
            Keyword::Bu => "BU_",
            Keyword::Bo => "BO_",
            Keyword::Sg => "SG_",
            Keyword::BoTxBu => "BO_TX_BU_",
            Keyword::Cm => "CM_",
            Keyword::BaDef => "BA_DEF_",
            Keyword::BaDefDef => "BA_DEF_DEF_",
            Keyword::Ba => "BA_",
            Keyword::Val => "VAL_",
            Keyword::ValTable => "VAL_TABLE_",
            Keyword::SigValType => "SIG_VALTYPE_",
            Keyword::Other(word) => word,
        }
    }
}

// Upper-case word ending in '_' such as EV_, SG_MUL_VAL_, BA_DEF_REL_
fn is_section_word(word: &str) -> bool {
    word.len() >= 3
        && word.ends_with('_')
        && word.starts_with(|c: char| c.is_ascii_uppercase())
        && word
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// One lexical token of a record body
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier (node, message, signal, attribute type keyword, multiplexer indicator)
    Ident(String),
    /// Numeric literal, kept verbatim (`-40`, `0x64`, `1E-005`)
    Number(String),
    /// Quoted string with escapes removed
    Str(String),
    /// Punctuation: `: | @ ( ) [ ] , ; + -`
    Punct(char),
}

/// One syntactic record: a keyword plus the tokens that follow it
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub keyword: Keyword,
    /// 1-based line number where the record starts
    pub line: usize,
    pub tokens: Vec<Token>,
}

impl Record {
    /// Sequential reader over the record tokens
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            tokens: &self.tokens,
            pos: 0,
        }
    }
}

/// Lazy record iterator over DBC text
pub struct Lexer<'a> {
    lines: Enumerate<Lines<'a>>,
    pending: Option<(usize, &'a str)>,
    skipped: Vec<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
        Self {
            lines: text.lines().enumerate(),
            pending: None,
            skipped: Vec::new(),
        }
    }

    /// Line numbers (1-based) of the lines that did not belong to any record
    pub fn skipped_lines(&self) -> &[usize] {
        &self.skipped
    }

    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        self.pending.take().or_else(|| self.lines.next())
    }

    /// Fold continuation lines into `body` until the record is complete
    fn fold_continuations(&mut self, keyword: &Keyword, body: &mut String) {
        while let Some((idx, line)) = self.lines.next() {
            let trimmed = line.trim();

            if in_open_string(body) {
                body.push('\n');
                body.push_str(trimmed);
                continue;
            }

            // the NS_ block runs until the next line starting in column 0
            if *keyword == Keyword::Ns {
                if trimmed.is_empty() {
                    continue;
                }
                if line.starts_with(char::is_whitespace) {
                    body.push(' ');
                    body.push_str(trimmed);
                    continue;
                }
            }

            let starts_record = Keyword::from_word(leading_word(trimmed)).is_some();
            if !starts_record
                && !trimmed.is_empty()
                && !trimmed.starts_with("//")
                && keyword.needs_terminator()
                && !is_terminated(body)
            {
                body.push(' ');
                body.push_str(trimmed);
                continue;
            }

            self.pending = Some((idx, line));
            break;
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let (idx, line) = self.next_line()?;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }

            let word = leading_word(trimmed);
            let keyword = match Keyword::from_word(word) {
                Some(keyword) => keyword,
                None => {
                    log::debug!("Skipping unrecognized DBC line {}: {}", idx + 1, trimmed);
                    self.skipped.push(idx + 1);
                    continue;
                }
            };

            let mut body = trimmed[word.len()..].to_string();
            self.fold_continuations(&keyword, &mut body);

            return Some(Record {
                keyword,
                line: idx + 1,
                tokens: tokenize(&body),
            });
        }
    }
}

fn leading_word(line: &str) -> &str {
    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(line.len());
    &line[..end]
}

// Count double quotes that are not escaped with a backslash.
pub(crate) fn count_unescaped_quotes(s: &str) -> usize {
    let mut count = 0usize;
    let mut backslashes = 0usize;
    for ch in s.chars() {
        if ch == '\\' {
            backslashes += 1;
            continue;
        }
        if ch == '"' && backslashes % 2 == 0 {
            count += 1;
        }
        backslashes = 0;
    }
    count
}

fn in_open_string(body: &str) -> bool {
    count_unescaped_quotes(body) % 2 == 1
}

fn is_terminated(body: &str) -> bool {
    body.trim_end().ends_with(';')
}

/// Split a record body into tokens
pub(crate) fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
        } else if c == '"' {
            let mut value = String::new();
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 1;
                }
                value.push(chars[i]);
                i += 1;
            }
            i += 1; // closing quote (or end of text for an unterminated string)
            tokens.push(Token::Str(value));
        } else if starts_number(&chars, i) {
            let start = i;
            i += 1;
            let digits = if matches!(c, '+' | '-') { start + 1 } else { start };
            let hex = chars[digits] == '0' && matches!(chars.get(digits + 1), Some('x' | 'X'));
            while i < chars.len() {
                let ch = chars[i];
                let exponent_sign = (ch == '+' || ch == '-')
                    && !hex
                    && matches!(chars[i - 1], 'e' | 'E');
                if ch.is_ascii_alphanumeric() || ch == '.' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }

    tokens
}

fn starts_number(chars: &[char], i: usize) -> bool {
    let digit_at = |j: usize| chars.get(j).is_some_and(|c| c.is_ascii_digit());
    match chars[i] {
        c if c.is_ascii_digit() => true,
        '-' | '+' => digit_at(i + 1) || (chars.get(i + 1) == Some(&'.') && digit_at(i + 2)),
        '.' => digit_at(i + 1),
        _ => false,
    }
}

/// Sequential token reader used by the record parsers
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    pub fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn ident(&mut self) -> Option<&'a str> {
        match self.peek()? {
            Token::Ident(s) => {
                self.pos += 1;
                Some(s)
            }
            _ => None,
        }
    }

    pub fn number(&mut self) -> Option<&'a str> {
        match self.peek()? {
            Token::Number(s) => {
                self.pos += 1;
                Some(s)
            }
            _ => None,
        }
    }

    pub fn string(&mut self) -> Option<&'a str> {
        match self.peek()? {
            Token::Str(s) => {
                self.pos += 1;
                Some(s)
            }
            _ => None,
        }
    }

    /// Consume `expected` if it is the next token
    pub fn punct(&mut self, expected: char) -> Option<()> {
        match self.peek()? {
            Token::Punct(c) if *c == expected => {
                self.pos += 1;
                Some(())
            }
            _ => None,
        }
    }

    /// True if the next token is the keyword-like identifier `word`
    pub fn peek_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == word)
    }

    pub fn is_at_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Punct(';')))
    }
}
