//! Token kinds and the fixed keyword and punctuator tables.

use alloc::string::String;
use core::fmt;

/// Where a token sits in the source. Offsets are bytes, line and column
/// start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    /// Covering span of `self` and `later`, positioned at `self`.
    pub fn join(self, later: Span) -> Self {
        Span {
            start: self.start.min(later.start),
            end: self.end.max(later.end),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Num(f64),
    Str(String),
    Ident(String),

    // Words the lexer never hands out as identifiers.
    True,
    False,
    Null,
    Break,
    Catch,
    Const,
    Continue,
    Do,
    Else,
    Finally,
    For,
    Function,
    If,
    Let,
    New,
    Return,
    This,
    Throw,
    Try,
    Typeof,
    Var,
    Void,
    While,

    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Semi,
    Comma,
    Colon,
    Question,
    Nullish,
    Arrow,

    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    Inc,
    Dec,
    Shl,
    Sar,
    Shr,
    Amp,
    Pipe,
    Caret,
    Bang,
    Tilde,
    AndAnd,
    OrOr,

    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,

    End,
}

/// Reserved words.
pub static KEYWORDS: [(&str, TokenKind); 23] = [
    ("true", TokenKind::True),
    ("false", TokenKind::False),
    ("null", TokenKind::Null),
    ("break", TokenKind::Break),
    ("catch", TokenKind::Catch),
    ("const", TokenKind::Const),
    ("continue", TokenKind::Continue),
    ("do", TokenKind::Do),
    ("else", TokenKind::Else),
    ("finally", TokenKind::Finally),
    ("for", TokenKind::For),
    ("function", TokenKind::Function),
    ("if", TokenKind::If),
    ("let", TokenKind::Let),
    ("new", TokenKind::New),
    ("return", TokenKind::Return),
    ("this", TokenKind::This),
    ("throw", TokenKind::Throw),
    ("try", TokenKind::Try),
    ("typeof", TokenKind::Typeof),
    ("var", TokenKind::Var),
    ("void", TokenKind::Void),
    ("while", TokenKind::While),
];

/// Punctuators, longest spelling first so a prefix scan takes the
/// longest match.
pub static PUNCTUATORS: [(&str, TokenKind); 45] = [
    (">>>", TokenKind::Shr),
    ("===", TokenKind::EqEqEq),
    ("!==", TokenKind::NotEqEq),
    ("=>", TokenKind::Arrow),
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::NotEq),
    ("<=", TokenKind::Le),
    (">=", TokenKind::Ge),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Sar),
    ("**", TokenKind::StarStar),
    ("++", TokenKind::Inc),
    ("--", TokenKind::Dec),
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    ("??", TokenKind::Nullish),
    ("+=", TokenKind::PlusEq),
    ("-=", TokenKind::MinusEq),
    ("*=", TokenKind::StarEq),
    ("/=", TokenKind::SlashEq),
    ("%=", TokenKind::PercentEq),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    (".", TokenKind::Dot),
    (";", TokenKind::Semi),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    ("?", TokenKind::Question),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("=", TokenKind::Eq),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("&", TokenKind::Amp),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
    ("!", TokenKind::Bang),
    ("~", TokenKind::Tilde),
];

impl TokenKind {
    /// `=` and the compound assignments.
    pub fn assigns(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
        )
    }

    pub fn keyword(word: &str) -> Option<TokenKind> {
        KEYWORDS
            .iter()
            .find(|(spelling, _)| *spelling == word)
            .map(|(_, kind)| kind.clone())
    }

    /// Fixed source spelling of a keyword or punctuator.
    pub fn spelling(&self) -> Option<&'static str> {
        KEYWORDS
            .iter()
            .chain(PUNCTUATORS.iter())
            .find(|(_, kind)| kind == self)
            .map(|(spelling, _)| *spelling)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Num(n) => write!(f, "{}", n),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::Ident(name) => f.write_str(name),
            TokenKind::End => f.write_str("end of input"),
            other => f.write_str(other.spelling().unwrap_or("?")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line break came between this token and the previous one.
    pub newline_before: bool,
}

impl Token {
    pub fn at_end(&self) -> bool {
        self.kind == TokenKind::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punctuators_prefer_longest() {
        for (i, (long, _)) in PUNCTUATORS.iter().enumerate() {
            for (short, _) in &PUNCTUATORS[..i] {
                assert!(
                    !long.starts_with(short) || long == short,
                    "{short:?} shadows {long:?}"
                );
            }
        }
    }

    #[test]
    fn test_display_spelling() {
        assert_eq!(alloc::format!("{}", TokenKind::Eq), "=");
        assert_eq!(alloc::format!("{}", TokenKind::Shr), ">>>");
        assert_eq!(alloc::format!("{}", TokenKind::While), "while");
        assert_eq!(alloc::format!("{}", TokenKind::End), "end of input");
        assert_eq!(TokenKind::keyword("typeof"), Some(TokenKind::Typeof));
        assert_eq!(TokenKind::keyword("Typeof"), None);
    }
}
