//! Lexer for the textual SSA format.
//!
//! Newlines are significant (one instruction per line), so they are
//! produced as tokens rather than skipped. Instruction mnemonics are
//! ordinary identifiers matched by the parser; their names are reserved.

use std::ops::Range;

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    #[token("\n")]
    Newline,

    #[regex(r"[A-Za-z_][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    #[token("=")]
    Assign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<-")]
    Arrow,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
}

/// A lexed token with its byte span in the source file.
pub type SpannedToken = (Token, Range<usize>);

/// Lexes a whole source file. Returns the token stream or the byte span of
/// the first unrecognised character.
pub fn lex(src: &str) -> Result<Vec<SpannedToken>, Range<usize>> {
    let mut out = Vec::new();
    let mut lexer = Token::lexer(src);
    while let Some(tok) = lexer.next() {
        match tok {
            Ok(t) => out.push((t, lexer.span())),
            Err(()) => return Err(lexer.span()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_instruction_line() {
        let toks = kinds("t0 = makechan chan int, 0:int\n");
        assert_eq!(
            vec![
                Token::Ident("t0".to_string()),
                Token::Assign,
                Token::Ident("makechan".to_string()),
                Token::Ident("chan".to_string()),
                Token::Ident("int".to_string()),
                Token::Comma,
                Token::Int(0),
                Token::Colon,
                Token::Ident("int".to_string()),
                Token::Newline,
            ],
            toks
        );
    }

    #[test]
    fn lex_operators_longest_match() {
        let toks = kinds("t1 = t0 <= 10:int");
        assert!(toks.contains(&Token::Le));
        let toks = kinds("t2 = recv ch");
        assert_eq!(Token::Ident("recv".to_string()), toks[2]);
    }

    #[test]
    fn lex_arrow_and_lt() {
        assert!(kinds("<-chan int").contains(&Token::Arrow));
        assert!(kinds("a < b").contains(&Token::Lt));
    }

    #[test]
    fn comments_are_skipped() {
        let toks = kinds("t0 = alloc T // a struct\n");
        assert!(!toks.iter().any(|t| matches!(t, Token::Slash)));
    }

    #[test]
    fn dollar_names() {
        let toks = kinds("main$1");
        assert_eq!(vec![Token::Ident("main$1".to_string())], toks);
    }
}
