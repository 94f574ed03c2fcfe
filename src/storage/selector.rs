//! Parser for series selectors of the form `name{label="value", ...}`.
//!
//! Supported operators are `=`, `!=`, `=~` and `!~`. A bare metric name
//! selects on `__name__`.

use super::labels::{Matcher, METRIC_NAME};
use crate::error::{Error, Result};
use std::iter::Peekable;
use std::str::Chars;

pub fn parse_selector(input: &str) -> Result<Vec<Matcher>> {
    let mut p = Parser {
        chars: input.chars().peekable(),
        input,
    };
    p.selector()
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    input: &'a str,
}

impl Parser<'_> {
    fn selector(&mut self) -> Result<Vec<Matcher>> {
        let mut matchers = vec![];

        self.skip_ws();
        if self.peek_is(is_ident_start) {
            let name = self.ident(true);
            matchers.push(Matcher::equal(METRIC_NAME, name));
        }

        self.skip_ws();
        if self.eat('{') {
            loop {
                self.skip_ws();
                if self.eat('}') {
                    break;
                }

                matchers.push(self.matcher()?);

                self.skip_ws();
                if self.eat(',') {
                    continue;
                }
                if self.eat('}') {
                    break;
                }
                return Err(self.error("expected ',' or '}'"));
            }
        }

        self.skip_ws();
        if self.chars.peek().is_some() {
            return Err(self.error("unexpected trailing input"));
        }
        if matchers.is_empty() {
            return Err(self.error("selector must contain at least one matcher"));
        }

        Ok(matchers)
    }

    fn matcher(&mut self) -> Result<Matcher> {
        if !self.peek_is(is_ident_start) {
            return Err(self.error("expected label name"));
        }
        let name = self.ident(false);

        self.skip_ws();
        let op = match (self.chars.next(), self.chars.peek().copied()) {
            (Some('='), Some('~')) => {
                self.chars.next();
                "=~"
            }
            (Some('='), _) => "=",
            (Some('!'), Some('=')) => {
                self.chars.next();
                "!="
            }
            (Some('!'), Some('~')) => {
                self.chars.next();
                "!~"
            }
            _ => return Err(self.error("expected one of '=', '!=', '=~', '!~'")),
        };

        self.skip_ws();
        let value = self.string()?;

        match op {
            "=" => Ok(Matcher::equal(name, value)),
            "!=" => Ok(Matcher::not_equal(name, value)),
            "=~" => Matcher::regex(name, &value),
            _ => Matcher::not_regex(name, &value),
        }
    }

    fn ident(&mut self, metric: bool) -> String {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || (metric && c == ':') {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    fn string(&mut self) -> Result<String> {
        let quote = match self.chars.next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected quoted label value")),
        };

        let mut s = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(s),
                Some('\\') => match self.chars.next() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(c) => s.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn skip_ws(&mut self) {
        while self.peek_is(char::is_whitespace) {
            self.chars.next();
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.chars.peek() == Some(&c) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn peek_is(&mut self, f: impl Fn(char) -> bool) -> bool {
        self.chars.peek().map_or(false, |&c| f(c))
    }

    fn error(&self, msg: &str) -> Error {
        Error::invalid_argument(format!("failed to parse query {:?}: {}", self.input, msg))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}
