use std::fmt;

use thiserror::Error;

use crate::defs::{parse_location_no_case, Location, UnknownLocation};

/// Separator between the destination and source pairs of an op.
pub const OP_SEPARATOR: &str = "<-";

/// Errors raised while parsing remap operands and ops.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OpParseError {
    #[error("invalid operand: wrong comma count: have={have} want=1 s=\"{operand}\"")]
    WrongCommaCount { have: usize, operand: String },

    #[error("invalid operation: wrong `<-` count: have={have} want=1 op=\"{op}\"")]
    WrongSeparatorCount { have: usize, op: String },

    #[error("invalid operand: {reason}: s=\"{operand}\"")]
    MalformedOperand { reason: &'static str, operand: String },

    #[error("invalid operand \"{operand}\": {source}")]
    UnknownLocation {
        operand: String,
        #[source]
        source: UnknownLocation,
    },
}

/// Two locations; for a remap, "the transition in `a` that leads to `b`".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LocPair {
    pub a: Location,
    pub b: Location,
}

/// Displays in the bracketed form accepted by [`parse_operand`], e.g.
/// `[6 MARS], [7 SHRINE]`.
impl fmt::Display for LocPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}], [{} {}]", self.a.0, self.a, self.b.0, self.b)
    }
}

/// Retarget the `dst.a -> dst.b` transitions to wherever the
/// `src.a -> src.b` transition leads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformOp {
    pub dst: LocPair,
    pub src: LocPair,
}

impl fmt::Display for TransformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.dst, self.src)
    }
}

// `[<digits> <word>]` starting at the beginning of `s`; returns the word and
// the rest of the input.
fn bracketed_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start().strip_prefix('[')?;
    let close = s.find(']')?;
    let (inner, rest) = (&s[..close], &s[close + 1..]);

    let mut parts = inner.split_whitespace();
    let index = parts.next()?;
    let word = parts.next()?;
    if parts.next().is_some() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !word.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((word, rest))
}

// Form A: `[<digits> <word>], [<digits> <word>]`.
fn parse_logged_operand(s: &str) -> Option<(&str, &str)> {
    let (first, rest) = bracketed_word(s)?;
    let rest = rest.trim_start().strip_prefix(',')?;
    let (second, rest) = bracketed_word(rest)?;
    rest.trim().is_empty().then_some((first, second))
}

fn resolve(token: &str) -> Result<Location, OpParseError> {
    parse_location_no_case(token).map_err(|source| OpParseError::UnknownLocation {
        operand: token.trim().to_string(),
        source,
    })
}

/// Parse one location pair, either in the logged bracket form
/// `[3 MARS], [7 SHRINE]` (the numbers are ignored) or as `mars,shrine`.
pub fn parse_operand(s: &str) -> Result<LocPair, OpParseError> {
    let s = s.trim();

    let (a, b) = match parse_logged_operand(s) {
        Some(words) => words,
        None if s.starts_with('[') => {
            return Err(OpParseError::MalformedOperand {
                reason: "malformed logged operand",
                operand: s.to_string(),
            });
        }
        None => {
            let parts: Vec<&str> = s.split(',').collect();
            if parts.len() != 2 {
                return Err(OpParseError::WrongCommaCount {
                    have: parts.len(),
                    operand: s.to_string(),
                });
            }
            if parts.iter().any(|p| p.trim().is_empty()) {
                return Err(OpParseError::MalformedOperand {
                    reason: "empty location name",
                    operand: s.to_string(),
                });
            }
            (parts[0], parts[1])
        }
    };

    Ok(LocPair {
        a: resolve(a)?,
        b: resolve(b)?,
    })
}

/// Parse `<dst pair> <- <src pair>`.
pub fn parse_trans_op(op: &str) -> Result<TransformOp, OpParseError> {
    let parts: Vec<&str> = op.split(OP_SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(OpParseError::WrongSeparatorCount {
            have: parts.len(),
            op: op.to_string(),
        });
    }

    Ok(TransformOp {
        dst: parse_operand(parts[0])?,
        src: parse_operand(parts[1])?,
    })
}

/// Parse a batch in order. The first bad op fails the whole batch.
pub fn parse_trans_ops<S: AsRef<str>>(ops: &[S]) -> Result<Vec<TransformOp>, OpParseError> {
    ops.iter().map(|s| parse_trans_op(s.as_ref())).collect()
}
