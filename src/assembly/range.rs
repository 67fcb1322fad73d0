//! Page range expressions
//!
//! Grammar: `expr := token ("," token)*`, `token := INT | INT "-" INT`.
//! Token order defines output order and duplicates are preserved, so
//! `"3,1,1-2"` resolves to `[3, 1, 1, 2]`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A single comma-separated token of a range expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeToken {
    /// A single page, e.g. `5`
    Page(u32),
    /// An inclusive ascending span, e.g. `8-10`
    Span { start: u32, end: u32 },
}

impl RangeToken {
    fn parse(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::RangeSyntax {
                token: token.to_string(),
            });
        }

        match token.matches('-').count() {
            0 => Ok(RangeToken::Page(parse_page_number(token, token)?)),
            1 => {
                let (start, end) = token.split_once('-').ok_or_else(|| Error::RangeSyntax {
                    token: token.to_string(),
                })?;
                let start = parse_page_number(start.trim(), token)?;
                let end = parse_page_number(end.trim(), token)?;
                if start > end {
                    return Err(Error::RangeOrder { start, end });
                }
                Ok(RangeToken::Span { start, end })
            }
            _ => Err(Error::RangeSyntax {
                token: token.to_string(),
            }),
        }
    }

    /// Number of pages this token resolves to
    pub fn len(&self) -> usize {
        match *self {
            RangeToken::Page(_) => 1,
            RangeToken::Span { start, end } => (end - start) as usize + 1,
        }
    }

    /// Always false: every token resolves to at least one page
    pub fn is_empty(&self) -> bool {
        false
    }

    /// First page number of this token that exceeds `page_count`, if any
    fn first_out_of_bounds(&self, page_count: u32) -> Option<u32> {
        match *self {
            RangeToken::Page(page) if page > page_count => Some(page),
            RangeToken::Span { start, end } if end > page_count => {
                Some(start.max(page_count.saturating_add(1)))
            }
            _ => None,
        }
    }

    fn pages(&self) -> impl Iterator<Item = u32> {
        match *self {
            RangeToken::Page(page) => page..=page,
            RangeToken::Span { start, end } => start..=end,
        }
    }
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeToken::Page(page) => write!(f, "{}", page),
            RangeToken::Span { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}

/// Parse one side of a token as a positive integer. Only ASCII digits are
/// accepted, so `+3`, `0` and overflowing values are all syntax errors.
fn parse_page_number(s: &str, token: &str) -> Result<u32> {
    let syntax_error = || Error::RangeSyntax {
        token: token.to_string(),
    };

    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(syntax_error());
    }
    match s.parse::<u32>() {
        Ok(0) | Err(_) => Err(syntax_error()),
        Ok(page) => Ok(page),
    }
}

/// A syntactically valid range expression, not yet checked against a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeExpression {
    tokens: Vec<RangeToken>,
}

impl RangeExpression {
    /// Parse the expression without bounds checking.
    ///
    /// Fails with [`Error::EmptySelection`] when the whole expression is blank,
    /// and with [`Error::RangeSyntax`] / [`Error::RangeOrder`] on the first bad token.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(Error::EmptySelection);
        }

        let tokens = expression
            .split(',')
            .map(|token| RangeToken::parse(token.trim()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { tokens })
    }

    /// The parsed tokens, in expression order
    pub fn tokens(&self) -> &[RangeToken] {
        &self.tokens
    }

    /// Total number of page numbers the expression resolves to
    pub fn page_len(&self) -> usize {
        self.tokens.iter().map(RangeToken::len).sum()
    }

    /// Check every page number against `1..=page_count` and expand the
    /// expression into an ordered page sequence.
    pub fn resolve(&self, page_count: u32) -> Result<Vec<u32>> {
        if let Some(page) = self
            .tokens
            .iter()
            .find_map(|token| token.first_out_of_bounds(page_count))
        {
            return Err(Error::PageOutOfBounds {
                page,
                total: page_count,
            });
        }

        let mut pages = Vec::with_capacity(self.page_len());
        for token in &self.tokens {
            pages.extend(token.pages());
        }
        Ok(pages)
    }
}

impl FromStr for RangeExpression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RangeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

/// Parse a range expression and resolve it against a document of
/// `page_count` pages, returning 1-indexed page numbers in expression order.
pub fn parse_page_range(expression: &str, page_count: u32) -> Result<Vec<u32>> {
    RangeExpression::parse(expression)?.resolve(page_count)
}
