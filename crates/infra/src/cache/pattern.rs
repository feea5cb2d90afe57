//! Key patterns for bulk invalidation.
//!
//! Accepts SQL LIKE wildcards (`%` any run, `_` one character) and their glob
//! aliases (`*`, `?`). Matching is case-sensitive. There is no escape syntax,
//! so those four characters are always wildcards.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyRun,
    AnyOne,
}

/// A parsed invalidation pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    raw: String,
    tokens: Vec<Token>,
}

impl KeyPattern {
    pub fn parse(raw: &str) -> Self {
        let tokens = raw
            .chars()
            .map(|c| match c {
                '%' | '*' => Token::AnyRun,
                '_' | '?' => Token::AnyOne,
                other => Token::Literal(other),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            tokens,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `true` if the pattern has no wildcard (exact-key match).
    pub fn is_exact(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Literal(_)))
    }

    /// Whole-key match.
    pub fn matches(&self, key: &str) -> bool {
        let text: Vec<char> = key.chars().collect();
        let (mut t, mut p) = (0usize, 0usize);
        // Position of the last `AnyRun` and the text index it was tried at.
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.tokens.get(p) {
                Some(Token::AnyOne) => {
                    t += 1;
                    p += 1;
                }
                Some(Token::Literal(c)) if *c == text[t] => {
                    t += 1;
                    p += 1;
                }
                Some(Token::AnyRun) => {
                    backtrack = Some((p, t));
                    p += 1;
                }
                _ => match backtrack {
                    Some((star_p, star_t)) => {
                        p = star_p + 1;
                        t = star_t + 1;
                        backtrack = Some((star_p, star_t + 1));
                    }
                    None => return false,
                },
            }
        }

        self.tokens[p..].iter().all(|tok| *tok == Token::AnyRun)
    }

    /// Equivalent SQLite `GLOB` expression (case-sensitive).
    pub fn to_glob(&self) -> String {
        let mut out = String::with_capacity(self.raw.len() + 4);
        for tok in &self.tokens {
            match tok {
                Token::AnyRun => out.push('*'),
                Token::AnyOne => out.push('?'),
                Token::Literal('[') => out.push_str("[[]"),
                Token::Literal(c) => out.push(*c),
            }
        }
        out
    }
}

impl core::fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}
