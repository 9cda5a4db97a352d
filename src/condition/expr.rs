/*!
 * Built-in Condition Language
 *
 * Grammar:
 * ```text
 * expr    := or
 * or      := and ( "||" and )*
 * and     := unary ( "&&" unary )*
 * unary   := "!" unary | primary
 * primary := "(" expr ")" | "true" | "false" | call
 * call    := ident ( "." ident )* "(" [ string ( "," string )* ] ")"
 * ```
 *
 * Functions:
 * - `$evaluation.grant()` / `$evaluation.deny()`
 * - `hasRole('r')`, `inGroup('/g')`, `isClient('c')`, `isUser('u')`
 * - `hasScope('s')`, `isOwner()`
 */

use super::{ConditionContext, ConditionError, ConditionEvaluator};
use crate::core::limits::{MAX_CONDITION_DEPTH, MAX_CONDITION_LENGTH};
use crate::core::types::GroupPath;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

/// Parsed expressions kept per evaluator
const MAX_CACHED_EXPRESSIONS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Not,
    And,
    Or,
    Ident(String),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Builtin {
    Grant,
    Deny,
    HasRole(String),
    InGroup(GroupPath),
    IsClient(String),
    IsUser(String),
    HasScope(String),
    IsOwner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Literal(bool),
    Call(Builtin),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

fn parse_error(offset: usize, message: impl Into<String>) -> ConditionError {
    ConditionError::Parse {
        offset,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push((offset, Token::LParen)),
            ')' => tokens.push((offset, Token::RParen)),
            ',' => tokens.push((offset, Token::Comma)),
            ';' if chars.peek().is_none() => {}
            '!' => tokens.push((offset, Token::Not)),
            '&' => match chars.next() {
                Some((_, '&')) => tokens.push((offset, Token::And)),
                _ => return Err(parse_error(offset, "expected '&&'")),
            },
            '|' => match chars.next() {
                Some((_, '|')) => tokens.push((offset, Token::Or)),
                _ => return Err(parse_error(offset, "expected '||'")),
            },
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        ch if ch == quote => {
                            closed = true;
                            break;
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(parse_error(offset, "unterminated string literal"));
                }
                tokens.push((offset, Token::Str(value)));
            }
            c if c == '$' || c == '_' || c.is_ascii_alphabetic() => {
                let mut ident = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next == '_' || next == '.' || next.is_ascii_alphanumeric() {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((offset, Token::Ident(ident)));
            }
            other => return Err(parse_error(offset, format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(tokens: Vec<(usize, Token)>, end: usize) -> Self {
        Self { tokens, pos: 0, end }
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        let offset = self.offset();
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(parse_error(offset, format!("expected {:?}, found {:?}", expected, t))),
            None => Err(parse_error(offset, format!("expected {:?}, found end of input", expected))),
        }
    }

    fn parse(mut self) -> Result<Expr, ConditionError> {
        if self.tokens.is_empty() {
            return Err(parse_error(0, "empty expression"));
        }
        let expr = self.or(0)?;
        if self.pos < self.tokens.len() {
            return Err(parse_error(self.offset(), "trailing input"));
        }
        Ok(expr)
    }

    fn guard_depth(&self, depth: usize) -> Result<(), ConditionError> {
        if depth > MAX_CONDITION_DEPTH {
            Err(ConditionError::Unsupported(format!(
                "expression nested deeper than {}",
                MAX_CONDITION_DEPTH
            )))
        } else {
            Ok(())
        }
    }

    fn or(&mut self, depth: usize) -> Result<Expr, ConditionError> {
        self.guard_depth(depth)?;
        let mut lhs = self.and(depth)?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.and(depth)?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self, depth: usize) -> Result<Expr, ConditionError> {
        let mut lhs = self.unary(depth)?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.unary(depth)?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self, depth: usize) -> Result<Expr, ConditionError> {
        self.guard_depth(depth)?;
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.unary(depth + 1)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary(depth)
    }

    fn primary(&mut self, depth: usize) -> Result<Expr, ConditionError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or(depth + 1)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == "true" => Ok(Expr::Literal(true)),
            Some(Token::Ident(name)) if name == "false" => Ok(Expr::Literal(false)),
            Some(Token::Ident(name)) => {
                let args = self.arguments()?;
                builtin(&name, args, offset).map(Expr::Call)
            }
            Some(t) => Err(parse_error(offset, format!("unexpected token {:?}", t))),
            None => Err(parse_error(offset, "unexpected end of input")),
        }
    }

    fn arguments(&mut self) -> Result<Vec<String>, ConditionError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(args);
        }
        loop {
            let offset = self.offset();
            match self.next() {
                Some(Token::Str(value)) => args.push(value),
                _ => return Err(parse_error(offset, "expected string argument")),
            }
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(parse_error(self.offset(), "expected ',' or ')'")),
            }
        }
    }
}

fn builtin(name: &str, mut args: Vec<String>, offset: usize) -> Result<Builtin, ConditionError> {
    let arity = match name {
        "$evaluation.grant" | "$evaluation.deny" | "isOwner" => 0,
        "hasRole" | "inGroup" | "isClient" | "isUser" | "hasScope" => 1,
        other => return Err(ConditionError::Unsupported(format!("unknown function '{}'", other))),
    };
    if args.len() != arity {
        return Err(parse_error(
            offset,
            format!("'{}' takes {} argument(s), got {}", name, arity, args.len()),
        ));
    }

    let arg = args.pop().unwrap_or_default();
    Ok(match name {
        "$evaluation.grant" => Builtin::Grant,
        "$evaluation.deny" => Builtin::Deny,
        "isOwner" => Builtin::IsOwner,
        "hasRole" => Builtin::HasRole(arg),
        "inGroup" => Builtin::InGroup(
            GroupPath::parse(&arg).map_err(|e| parse_error(offset, e.to_string()))?,
        ),
        "isClient" => Builtin::IsClient(arg),
        "isUser" => Builtin::IsUser(arg),
        _ => Builtin::HasScope(arg),
    })
}

fn eval(expr: &Expr, ctx: &ConditionContext) -> bool {
    match expr {
        Expr::Literal(value) => *value,
        Expr::Not(inner) => !eval(inner, ctx),
        Expr::And(lhs, rhs) => eval(lhs, ctx) && eval(rhs, ctx),
        Expr::Or(lhs, rhs) => eval(lhs, ctx) || eval(rhs, ctx),
        Expr::Call(call) => match call {
            Builtin::Grant => true,
            Builtin::Deny => false,
            Builtin::HasRole(role) => ctx.has_role(role),
            Builtin::InGroup(group) => ctx.in_group(group),
            Builtin::IsClient(client) => ctx.is_client(client),
            Builtin::IsUser(user) => ctx.requester.user.as_str() == user,
            Builtin::HasScope(scope) => ctx.scope == *scope,
            Builtin::IsOwner => ctx.is_owner(),
        },
    }
}

/// Evaluator for the built-in condition language
///
/// Work per evaluation is bounded by `MAX_CONDITION_LENGTH` and
/// `MAX_CONDITION_DEPTH`, and evaluation has no side effects.
#[derive(Clone)]
pub struct ExpressionEvaluator {
    cache: Arc<DashMap<String, Arc<Expr>, RandomState>>,
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    fn compile(&self, expression: &str) -> Result<Arc<Expr>, ConditionError> {
        if let Some(cached) = self.cache.get(expression) {
            return Ok(Arc::clone(cached.value()));
        }

        if expression.len() > MAX_CONDITION_LENGTH {
            return Err(ConditionError::Unsupported(format!(
                "expression longer than {} bytes",
                MAX_CONDITION_LENGTH
            )));
        }

        let tokens = tokenize(expression)?;
        let parsed = Arc::new(Parser::new(tokens, expression.len()).parse()?);

        if self.cache.len() >= MAX_CACHED_EXPRESSIONS {
            self.cache.clear();
        }
        self.cache.insert(expression.to_string(), Arc::clone(&parsed));
        Ok(parsed)
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator for ExpressionEvaluator {
    fn evaluate(&self, expression: &str, context: &ConditionContext) -> Result<bool, ConditionError> {
        let compiled = self.compile(expression)?;
        Ok(eval(&compiled, context))
    }

    fn validate(&self, expression: &str) -> Result<(), ConditionError> {
        self.compile(expression).map(|_| ())
    }

    fn is_bounded(&self) -> bool {
        true
    }
}
