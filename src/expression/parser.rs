//! Precedence-climbing parser.
//!
//! Operator precedence, loosest first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | 0 | `&&` `\|\|` |
//! | 1 | `==` `===` `!=` `!==` `>` `>=` `<` `<=` |
//! | 2 | `+` `-` |
//! | 3 | `*` `/` `%` |
//!
//! Operators of equal precedence associate left to right.

use crate::error::ExpressionError;
use crate::types::Value;

use super::ast::{Expr, Path};
use super::lexer::{Token, tokenize};

/// Parse an expression source (without the leading-`$` schema sigil handling).
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    if source.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }

    let tokens = tokenize(source)?;

    if let Some(Token::Op(op)) = tokens.first() {
        return Err(ExpressionError::LeadingOperator {
            operator: op.symbol().to_string(),
            expression: source.to_string(),
        });
    }
    if let Some(Token::Op(op)) = tokens.last() {
        let operand = tokens
            .len()
            .checked_sub(2)
            .map(|i| tokens[i].describe())
            .unwrap_or_default();
        return Err(ExpressionError::TrailingOperator {
            fragment: format!("{operand}{}", op.symbol()),
            expression: source.to_string(),
        });
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
    };
    let expr = parser.binary(0)?;

    match parser.peek() {
        None => Ok(expr),
        Some(Token::RParen) => Err(parser.unbalanced()),
        Some(token) => Err(ExpressionError::UnexpectedToken {
            token: token.describe(),
            expression: source.to_string(),
        }),
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unbalanced(&self) -> ExpressionError {
        ExpressionError::UnbalancedParens {
            expression: self.source.to_string(),
        }
    }

    fn unexpected(&self, token: &Token) -> ExpressionError {
        ExpressionError::UnexpectedToken {
            token: token.describe(),
            expression: self.source.to_string(),
        }
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, ExpressionError> {
        let mut left = self.operand()?;

        while let Some(&Token::Op(op)) = self.peek() {
            if op.precedence() < min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.binary(op.precedence() + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn operand(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Word(word)) => Ok(Expr::Literal(self.word(word)?)),
            Some(Token::Ident(root)) => self.reference(root),
            Some(Token::LParen) => {
                let inner = self.binary(0)?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.unbalanced()),
                }
            }
            Some(Token::RParen) => Err(self.unbalanced()),
            Some(token @ Token::Op(_)) => Err(self.unexpected(&token)),
            Some(_) | None => Err(ExpressionError::ExpectedOperand {
                expression: self.source.to_string(),
            }),
        }
    }

    /// Keyword literal, or an unquoted string such as `form-input` or `example.com`.
    fn word(&mut self, word: String) -> Result<Value, ExpressionError> {
        let value = match word.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            "undefined" => Value::Undefined,
            _ => {
                let mut text = word;
                for segment in self.member_segments()? {
                    text.push('.');
                    text.push_str(&segment);
                }
                return Ok(Value::String(text));
            }
        };
        Ok(value)
    }

    fn member_segments(&mut self) -> Result<Vec<String>, ExpressionError> {
        let mut segments = Vec::new();
        while let Some(Token::Dot) = self.peek() {
            self.pos += 1;
            match self.next() {
                Some(Token::Word(segment)) => segments.push(segment),
                Some(token) => return Err(self.unexpected(&token)),
                None => {
                    return Err(ExpressionError::ExpectedOperand {
                        expression: self.source.to_string(),
                    });
                }
            }
        }
        Ok(segments)
    }

    fn reference(&mut self, root: String) -> Result<Expr, ExpressionError> {
        let segments = self.member_segments()?;

        if !matches!(self.peek(), Some(Token::LParen)) {
            return Ok(Expr::Path(Path { root, segments }));
        }
        self.pos += 1;

        let callee = match (root.as_str(), segments.as_slice()) {
            ("fns", [name]) => name.clone(),
            (_, []) => root,
            _ => {
                let mut name = root;
                for segment in &segments {
                    name.push('.');
                    name.push_str(segment);
                }
                name
            }
        };

        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.binary(0)?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    Some(token) => return Err(self.unexpected(&token)),
                    None => return Err(self.unbalanced()),
                }
            }
        }

        let tail = self.member_segments()?;
        Ok(Expr::Call { callee, args, tail })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ast::BinaryOp;

    fn path(root: &str, segments: &[&str]) -> Expr {
        Expr::Path(Path {
            root: root.to_string(),
            segments: segments.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_empty_is_error() {
        assert_eq!(parse(""), Err(ExpressionError::Empty));
        assert_eq!(parse("   "), Err(ExpressionError::Empty));
    }

    #[test]
    fn test_leading_operator_cites_operator() {
        match parse("+ == 10") {
            Err(ExpressionError::LeadingOperator { operator, .. }) => assert_eq!(operator, "+"),
            other => panic!("expected leading operator error, got {other:?}"),
        }
    }

    #[test]
    fn test_trailing_operator_cites_fragment() {
        match parse("1 == 10+") {
            Err(ExpressionError::TrailingOperator {
                fragment,
                expression,
            }) => {
                assert_eq!(fragment, "10+");
                assert_eq!(expression, "1 == 10+");
            }
            other => panic!("expected trailing operator error, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let expr = parse("$a + 2 * 3 > 4 && $b").unwrap();
        let Expr::Binary { op, left, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::And);
        let Expr::Binary { op, left, .. } = *left else {
            panic!("expected comparison");
        };
        assert_eq!(op, BinaryOp::Gt);
        let Expr::Binary { op, right, .. } = *left else {
            panic!("expected addition");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_member_path() {
        assert_eq!(parse("$item.user.name").unwrap(), path("item", &["user", "name"]));
    }

    #[test]
    fn test_function_calls() {
        let expr = parse("$fns.join($a, 'x').length").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                callee: "join".into(),
                args: vec![path("a", &[]), Expr::Literal(Value::from("x"))],
                tail: vec!["length".into()],
            }
        );

        let expr = parse("$upper()").unwrap();
        assert!(matches!(expr, Expr::Call { ref callee, ref args, .. } if callee == "upper" && args.is_empty()));
    }

    #[test]
    fn test_grouping() {
        let expr = parse("($a + 1) * 2").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_unbalanced_parens() {
        assert!(matches!(parse("($a + 1"), Err(ExpressionError::UnbalancedParens { .. })));
        assert!(matches!(parse("$a + 1)"), Err(ExpressionError::UnbalancedParens { .. })));
    }

    #[test]
    fn test_bare_words_are_strings() {
        assert_eq!(parse("form-input").unwrap(), Expr::Literal(Value::from("form-input")));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Value::Null));
    }
}
