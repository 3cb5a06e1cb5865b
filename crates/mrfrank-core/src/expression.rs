//! # Expressions
//!
//! An expression describes how a clique's terms combine into one retrievable
//! unit: a single term, an ordered window, or an unordered window. Its
//! string form (`#od1( a b )`, `#uw8( a b )`) is the postings cache key.

use crate::primitives::{DEFAULT_ORDERED_GAP, DEFAULT_UNORDERED_WIDTH};
use crate::MrfError;

/// A retrievable unit over one or more query terms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expression {
    /// A single term.
    Term(String),
    /// Terms in order, each at most `gap` positions after the previous one.
    Ordered { gap: u32, terms: Vec<String> },
    /// All terms within a span of `width` positions, any order.
    Unordered { width: u32, terms: Vec<String> },
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Term(t) => write!(f, "{}", t),
            Self::Ordered { gap, terms } => write!(f, "#od{}( {} )", gap, terms.join(" ")),
            Self::Unordered { width, terms } => write!(f, "#uw{}( {} )", width, terms.join(" ")),
        }
    }
}

// =============================================================================
// EXPRESSION GENERATOR
// =============================================================================

/// Maps a clique's term nodes to an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionGenerator {
    /// Single-term lookup.
    Term,
    /// Ordered window with a fixed gap.
    Ordered { gap: u32 },
    /// Unordered window. Unless `fixed`, the width is scaled by the number
    /// of terms (`width = 4` gives `#uw8` for a bigram).
    Unordered { width: u32, fixed: bool },
}

impl ExpressionGenerator {
    /// Resolve a generator by name.
    ///
    /// Known names: `term`, `ordered`, `unordered`.
    pub fn from_name(
        name: &str,
        gap: Option<u32>,
        width: Option<u32>,
        fixed: bool,
    ) -> Result<Self, MrfError> {
        match name {
            "term" => Ok(Self::Term),
            "ordered" => {
                let gap = gap.unwrap_or(DEFAULT_ORDERED_GAP);
                if gap == 0 {
                    return Err(MrfError::config("ordered window gap must be at least 1"));
                }
                Ok(Self::Ordered { gap })
            }
            "unordered" => {
                let width = width.unwrap_or(DEFAULT_UNORDERED_WIDTH);
                if width == 0 {
                    return Err(MrfError::config("unordered window width must be at least 1"));
                }
                Ok(Self::Unordered { width, fixed })
            }
            other => Err(MrfError::config(format!(
                "unknown expression generator '{}'",
                other
            ))),
        }
    }

    /// Build the expression for a list of terms.
    pub fn expression(&self, terms: &[String]) -> Result<Expression, MrfError> {
        match (self, terms) {
            (_, []) => Err(MrfError::config("expression needs at least one term")),
            (Self::Term, [term]) => Ok(Expression::Term(term.clone())),
            (Self::Term, _) => Err(MrfError::config(format!(
                "term generator given {} terms",
                terms.len()
            ))),
            (Self::Ordered { .. } | Self::Unordered { .. }, [term]) => {
                Ok(Expression::Term(term.clone()))
            }
            (Self::Ordered { gap }, _) => Ok(Expression::Ordered {
                gap: *gap,
                terms: terms.to_vec(),
            }),
            (Self::Unordered { width, fixed }, _) => {
                let width = if *fixed {
                    *width
                } else {
                    width.saturating_mul(terms.len() as u32)
                };
                Ok(Expression::Unordered {
                    width,
                    terms: terms.to_vec(),
                })
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn display_forms() {
        let od = ExpressionGenerator::from_name("ordered", None, None, false)
            .expect("gen")
            .expression(&terms(&["a", "b"]))
            .expect("expr");
        assert_eq!(od.to_string(), "#od1( a b )");

        let uw = ExpressionGenerator::from_name("unordered", None, None, false)
            .expect("gen")
            .expression(&terms(&["a", "b", "c"]))
            .expect("expr");
        assert_eq!(uw.to_string(), "#uw12( a b c )");

        let fixed = ExpressionGenerator::from_name("unordered", None, Some(8), true)
            .expect("gen")
            .expression(&terms(&["a", "b", "c"]))
            .expect("expr");
        assert_eq!(fixed.to_string(), "#uw8( a b c )");
    }

    #[test]
    fn single_term_window_degenerates() {
        let expr = ExpressionGenerator::Ordered { gap: 1 }
            .expression(&terms(&["solo"]))
            .expect("expr");
        assert_eq!(expr, Expression::Term("solo".to_string()));
    }

    #[test]
    fn invalid_generators() {
        assert!(ExpressionGenerator::from_name("phrase", None, None, false).is_err());
        assert!(ExpressionGenerator::from_name("ordered", Some(0), None, false).is_err());
        assert!(ExpressionGenerator::Term.expression(&terms(&["a", "b"])).is_err());
        assert!(ExpressionGenerator::Term.expression(&[]).is_err());
    }
}
