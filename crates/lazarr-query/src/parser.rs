//! Recursive-descent query parser.
//!
//! Compiles a query string into an expression over the fields of a
//! structured base. Precedence, loosest first: `|`, `&`, comparisons,
//! `+ -`, `* /`, unary `- ~` and `**`, atoms. Because identifiers resolve
//! through the base's dtype and every operator goes through the fallible
//! expression builders, name and type mistakes surface here, before any
//! chunk is read.

use lazarr_core::error::{Error, Result};

use lazarr_expr::{where_, Expression};

use crate::lexer::{tokenize, Tok};

/// Compile `text` against the fields of `base` (a structured expression).
pub fn parse_query(text: &str, base: &Expression) -> Result<Expression> {
    let toks = tokenize(text)?;
    let mut p = Parser {
        toks,
        pos: 0,
        base,
    };
    let expr = p.or_expr()?;
    if p.pos != p.toks.len() {
        return Err(Error::Syntax(format!(
            "unexpected trailing input at token {}",
            p.pos
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    toks: Vec<Tok>,
    pos: usize,
    base: &'a Expression,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Tok) -> Result<()> {
        match self.bump() {
            Some(ref t) if t == want => Ok(()),
            Some(t) => Err(Error::Syntax(format!("expected {want:?}, found {t:?}"))),
            None => Err(Error::Syntax(format!(
                "expected {want:?}, found end of query"
            ))),
        }
    }

    fn or_expr(&mut self) -> Result<Expression> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&Tok::Pipe) {
            self.bump();
            let rhs = self.and_expr()?;
            lhs = lhs.or(rhs)?;
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expression> {
        let mut lhs = self.cmp_expr()?;
        while self.peek() == Some(&Tok::Amp) {
            self.bump();
            let rhs = self.cmp_expr()?;
            lhs = lhs.and(rhs)?;
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> Result<Expression> {
        let lhs = self.add_expr()?;
        let op = match self.peek() {
            Some(
                t @ (Tok::Lt | Tok::Le | Tok::Gt | Tok::Ge | Tok::EqEq | Tok::Ne),
            ) => t.clone(),
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.add_expr()?;
        match op {
            Tok::Lt => lhs.lt(rhs),
            Tok::Le => lhs.le(rhs),
            Tok::Gt => lhs.gt(rhs),
            Tok::Ge => lhs.ge(rhs),
            Tok::EqEq => lhs.eq(rhs),
            _ => lhs.ne(rhs),
        }
    }

    fn add_expr(&mut self) -> Result<Expression> {
        let mut lhs = self.mul_expr()?;
        loop {
            let plus = match self.peek() {
                Some(Tok::Plus) => true,
                Some(Tok::Minus) => false,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.mul_expr()?;
            lhs = if plus { lhs.add(rhs)? } else { lhs.sub(rhs)? };
        }
    }

    fn mul_expr(&mut self) -> Result<Expression> {
        let mut lhs = self.unary_expr()?;
        loop {
            let mul = match self.peek() {
                Some(Tok::Star) => true,
                Some(Tok::Slash) => false,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary_expr()?;
            lhs = if mul { lhs.mul(rhs)? } else { lhs.div(rhs)? };
        }
    }

    fn unary_expr(&mut self) -> Result<Expression> {
        match self.peek() {
            Some(Tok::Minus) => {
                self.bump();
                self.unary_expr()?.neg()
            }
            Some(Tok::Tilde) => {
                self.bump();
                self.unary_expr()?.not()
            }
            _ => self.pow_expr(),
        }
    }

    fn pow_expr(&mut self) -> Result<Expression> {
        let base = self.atom()?;
        if self.peek() == Some(&Tok::StarStar) {
            self.bump();
            // right-associative, and tighter than unary on the right
            let exp = self.unary_expr()?;
            return base.pow(exp);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expression> {
        match self.bump() {
            Some(Tok::Int(v)) => Ok(Expression::from(v)),
            Some(Tok::Float(v)) => Ok(Expression::from(v)),
            Some(Tok::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) => {
                if self.peek() == Some(&Tok::LParen) {
                    self.bump();
                    self.call(&name)
                } else {
                    // field of the structured base
                    self.base.field(&name)
                }
            }
            Some(t) => Err(Error::Syntax(format!("unexpected token {t:?}"))),
            None => Err(Error::Syntax("unexpected end of query".into())),
        }
    }

    fn call(&mut self, name: &str) -> Result<Expression> {
        if name == "where" {
            let cond = self.or_expr()?;
            self.expect(&Tok::Comma)?;
            let a = self.or_expr()?;
            self.expect(&Tok::Comma)?;
            let b = self.or_expr()?;
            self.expect(&Tok::RParen)?;
            return where_(&cond, a, b);
        }
        let f: fn(&Expression) -> Result<Expression> = match name {
            "abs" => Expression::abs,
            "sqrt" => Expression::sqrt,
            "sin" => Expression::sin,
            "cos" => Expression::cos,
            "tan" => Expression::tan,
            "arcsin" => Expression::arcsin,
            "arccos" => Expression::arccos,
            "arctan" => Expression::arctan,
            "sinh" => Expression::sinh,
            "cosh" => Expression::cosh,
            "tanh" => Expression::tanh,
            "exp" => Expression::exp,
            "log" => Expression::log,
            "log10" => Expression::log10,
            other => {
                return Err(Error::Syntax(format!(
                    "unknown function '{other}' in query"
                )))
            }
        };
        let arg = self.or_expr()?;
        self.expect(&Tok::RParen)?;
        f(&arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazarr_core::buffer::Buffer;
    use lazarr_core::dtype::DType;
    use lazarr_store::MemArray;

    fn base() -> Expression {
        let rec = MemArray::from_record(
            vec![4],
            vec![2],
            vec![
                ("a".into(), Buffer::F64(vec![1.0, 2.0, 3.0, 4.0])),
                ("b".into(), Buffer::F64(vec![4.0, 3.0, 2.0, 1.0])),
                ("c".into(), Buffer::I64(vec![0, 1, 2, 3])),
            ],
        )
        .unwrap();
        Expression::from_store(rec).unwrap()
    }

    #[test]
    fn precedence_groups_comparisons_under_and() {
        let e = parse_query("a > b & c < 2", &base()).unwrap();
        assert_eq!(e.dtype(), &DType::Bool);
        assert_eq!(format!("{e}"), "((o0.a > o0.b) & (o0.c < 2))");
    }

    #[test]
    fn arithmetic_binds_tighter_than_comparison() {
        let e = parse_query("a + b * 2 > 5", &base()).unwrap();
        assert_eq!(format!("{e}"), "((o0.a + (o0.b * 2)) > 5)");
    }

    #[test]
    fn function_calls_and_unary() {
        let e = parse_query("(a > b) & (sin(c) > .5)", &base()).unwrap();
        assert_eq!(e.dtype(), &DType::Bool);
        let e = parse_query("~(a == b)", &base()).unwrap();
        assert_eq!(e.dtype(), &DType::Bool);
    }

    #[test]
    fn power_is_right_associative() {
        let e = parse_query("a ** 2 ** 3", &base()).unwrap();
        assert_eq!(format!("{e}"), "(o0.a ** (2 ** 3))");
    }

    #[test]
    fn unknown_field_is_a_name_error() {
        assert!(matches!(
            parse_query("nope > 1", &base()),
            Err(Error::Name(_))
        ));
    }

    #[test]
    fn unknown_function_is_a_syntax_error() {
        assert!(matches!(
            parse_query("contains(a, 1)", &base()),
            Err(Error::Syntax(_))
        ));
    }

    #[test]
    fn malformed_queries_fail_cleanly() {
        assert!(parse_query("a >", &base()).is_err());
        assert!(parse_query("(a > 1", &base()).is_err());
        assert!(parse_query("a > 1)", &base()).is_err());
        assert!(parse_query("", &base()).is_err());
    }
}
