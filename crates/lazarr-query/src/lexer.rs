//! Query tokenizer.
//!
//! Produces the full token stream up front; any malformed input is a
//! `Syntax` error with the offending position.

use lazarr_core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    Amp,
    Pipe,
    Tilde,
    LParen,
    RParen,
    Comma,
}

pub fn tokenize(text: &str) -> Result<Vec<Tok>> {
    let bytes = text.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                toks.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    toks.push(Tok::StarStar);
                    i += 2;
                } else {
                    toks.push(Tok::Star);
                    i += 1;
                }
            }
            '/' => {
                toks.push(Tok::Slash);
                i += 1;
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::Le);
                    i += 2;
                } else {
                    toks.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::Ge);
                    i += 2;
                } else {
                    toks.push(Tok::Gt);
                    i += 1;
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::EqEq);
                    i += 2;
                } else {
                    return Err(Error::Syntax(format!(
                        "unexpected '=' at position {i}; did you mean '=='?"
                    )));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::Ne);
                    i += 2;
                } else {
                    return Err(Error::Syntax(format!("unexpected '!' at position {i}")));
                }
            }
            '&' => {
                toks.push(Tok::Amp);
                i += 1;
            }
            '|' => {
                toks.push(Tok::Pipe);
                i += 1;
            }
            '~' => {
                toks.push(Tok::Tilde);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '"' | '\'' => {
                return Err(Error::Syntax(
                    "string literals are not supported in queries".into(),
                ))
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                let mut is_float = false;
                while i < bytes.len() {
                    let d = bytes[i] as char;
                    if d.is_ascii_digit() {
                        i += 1;
                    } else if d == '.' && !is_float {
                        is_float = true;
                        i += 1;
                    } else if (d == 'e' || d == 'E') && i > start {
                        is_float = true;
                        i += 1;
                        if matches!(bytes.get(i), Some(b'+') | Some(b'-')) {
                            i += 1;
                        }
                    } else {
                        break;
                    }
                }
                let lit = &text[start..i];
                if is_float {
                    let v: f64 = lit.parse().map_err(|_| {
                        Error::Syntax(format!("malformed number '{lit}' at position {start}"))
                    })?;
                    toks.push(Tok::Float(v));
                } else {
                    let v: i64 = lit.parse().map_err(|_| {
                        Error::Syntax(format!("malformed number '{lit}' at position {start}"))
                    })?;
                    toks.push(Tok::Int(v));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                toks.push(Tok::Ident(text[start..i].to_string()));
            }
            other => {
                return Err(Error::Syntax(format!(
                    "unexpected character '{other}' at position {i}"
                )))
            }
        }
    }
    Ok(toks)
}
