//! Tokenizer for the expression language.

use crate::error::ExpressionError;

use super::ast::BinaryOp;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    /// Quoted string literal, quotes removed.
    Str(String),
    /// `$name` reference, sigil removed.
    Ident(String),
    /// Bare word: a keyword literal or an unquoted string.
    Word(String),
    Dot,
    Comma,
    LParen,
    RParen,
    Op(BinaryOp),
}

impl Token {
    /// Source form, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => crate::types::format_number(*n),
            Token::Str(s) => format!("'{s}'"),
            Token::Ident(name) => format!("${name}"),
            Token::Word(word) => word.clone(),
            Token::Dot => ".".to_string(),
            Token::Comma => ",".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Op(op) => op.symbol().to_string(),
        }
    }
}

/// Longest match first.
const OPERATORS: &[(&str, BinaryOp)] = &[
    ("===", BinaryOp::StrictEq),
    ("!==", BinaryOp::StrictNe),
    ("==", BinaryOp::Eq),
    ("!=", BinaryOp::Ne),
    (">=", BinaryOp::Ge),
    ("<=", BinaryOp::Le),
    ("&&", BinaryOp::And),
    ("||", BinaryOp::Or),
    (">", BinaryOp::Gt),
    ("<", BinaryOp::Lt),
    ("+", BinaryOp::Add),
    ("-", BinaryOp::Sub),
    ("*", BinaryOp::Mul),
    ("/", BinaryOp::Div),
    ("%", BinaryOp::Rem),
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A dot after one of these is member access, never a decimal point.
fn follows_member_target(tokens: &[Token]) -> bool {
    matches!(
        tokens.last(),
        Some(Token::Ident(_) | Token::Word(_) | Token::RParen)
    )
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Member segment after a dot: `$item.0`, `$fns.max`
        if matches!(tokens.last(), Some(Token::Dot)) && is_word_char(c) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' if follows_member_target(&tokens)
                || !chars.get(i + 1).is_some_and(char::is_ascii_digit) =>
            {
                tokens.push(Token::Dot);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ExpressionError::UnterminatedString {
                                expression: source.to_string(),
                            });
                        }
                        Some('\\') if i + 1 < chars.len() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '$' => {
                let start = i + 1;
                i = start;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                if i == start {
                    return Err(ExpressionError::UnexpectedToken {
                        token: "$".to_string(),
                        expression: source.to_string(),
                    });
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| ExpressionError::UnexpectedToken {
                    token: text.clone(),
                    expression: source.to_string(),
                })?;
                tokens.push(Token::Number(number));
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() && (is_word_char(chars[i]) || chars[i] == '-') {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            _ => {
                let rest: String = chars[i..].iter().take(3).collect();
                let matched = OPERATORS.iter().find(|(symbol, _)| rest.starts_with(symbol));
                match matched {
                    Some((symbol, op)) => {
                        tokens.push(Token::Op(*op));
                        i += symbol.chars().count();
                    }
                    None => {
                        return Err(ExpressionError::UnexpectedToken {
                            token: c.to_string(),
                            expression: source.to_string(),
                        });
                    }
                }
            }
        }
    }

    Ok(tokens)
}
