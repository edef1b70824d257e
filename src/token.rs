use serde::{Deserialize, Serialize};
use std::fmt;

/// A single unit of a tokenized URL.
///
/// Host labels are emitted as [`Token::Literal`] with a leading `.`, path
/// characters are emitted one at a time, and runs of consecutive digits
/// collapse to a single [`Token::DigitRun`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Token {
    Literal(String),
    DigitRun,
}

impl Token {
    pub fn literal(s: impl Into<String>) -> Self {
        Token::Literal(s.into())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(s) => write!(f, "{s}"),
            Token::DigitRun => write!(f, "<digit>"),
        }
    }
}

/// An ordered sequence of tokens, the unit of insertion/lookup in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenSequence(pub Vec<Token>);

impl TokenSequence {
    pub fn new(tokens: Vec<Token>) -> Self {
        TokenSequence(tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[Token] {
        &self.0
    }

    /// Longest common prefix length shared with `other`.
    pub fn common_prefix_len(&self, other: &[Token]) -> usize {
        self.0
            .iter()
            .zip(other.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Reversed copy of this sequence, used by the reverse-prune pass.
    pub fn reversed(&self) -> Self {
        let mut tokens = self.0.clone();
        tokens.reverse();
        TokenSequence(tokens)
    }
}

impl From<Vec<Token>> for TokenSequence {
    fn from(tokens: Vec<Token>) -> Self {
        TokenSequence(tokens)
    }
}

impl FromIterator<Token> for TokenSequence {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        TokenSequence(iter.into_iter().collect())
    }
}
