//! Shell-style patterns for field names.
//!
//! `?` matches one character, `*` any run (possibly empty); every other
//! character, `.` included, matches itself. A pattern matches whole names.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    AnyRun,
}

/// A compiled field-name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    source: String,
    tokens: Vec<Token>,
}

impl Glob {
    pub fn new(pattern: &str) -> Self {
        let mut tokens = Vec::with_capacity(pattern.len());
        for c in pattern.chars() {
            let token = match c {
                '?' => Token::AnyChar,
                '*' => Token::AnyRun,
                c => Token::Literal(c),
            };
            // consecutive stars are one star
            if token == Token::AnyRun && tokens.last() == Some(&Token::AnyRun) {
                continue;
            }
            tokens.push(token);
        }
        Self {
            source: pattern.to_string(),
            tokens,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Pattern without wildcards.
    pub fn is_literal(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Literal(_)))
    }

    pub fn matches(&self, name: &str) -> bool {
        let chars: Vec<char> = name.chars().collect();
        let (mut t, mut c) = (0, 0);
        // last star position in the pattern and the name position it resumes from
        let mut backtrack: Option<(usize, usize)> = None;
        while c < chars.len() {
            match self.tokens.get(t) {
                Some(Token::AnyRun) => {
                    backtrack = Some((t, c));
                    t += 1;
                }
                Some(Token::AnyChar) => {
                    t += 1;
                    c += 1;
                }
                Some(Token::Literal(l)) if *l == chars[c] => {
                    t += 1;
                    c += 1;
                }
                _ => match backtrack {
                    Some((star, from)) => {
                        t = star + 1;
                        c = from + 1;
                        backtrack = Some((star, from + 1));
                    }
                    None => return false,
                },
            }
        }
        self.tokens[t..].iter().all(|tok| *tok == Token::AnyRun)
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Does `name` match the shell-style `pattern`?
pub fn glob_match(pattern: &str, name: &str) -> bool {
    Glob::new(pattern).matches(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert!(glob_match("SURFTEMPERATURE", "SURFTEMPERATURE"));
        assert!(!glob_match("SURFTEMPERATURE", "SURFTEMPERATUR"));
        assert!(!glob_match("SURFTEMPERATUR", "SURFTEMPERATURE"));
        assert!(Glob::new("SURFTEMPERATURE").is_literal());
    }

    #[test]
    fn test_dot_is_literal() {
        assert!(glob_match("CLSVENT.ZONAL", "CLSVENT.ZONAL"));
        assert!(!glob_match("CLSVENT.ZONAL", "CLSVENTxZONAL"));
    }

    #[test]
    fn test_question_mark() {
        assert!(glob_match("S0??TEMPERATURE", "S090TEMPERATURE"));
        assert!(!glob_match("S0??TEMPERATURE", "S0900TEMPERATURE"));
        assert!(!glob_match("S?", "S"));
    }

    #[test]
    fn test_star() {
        assert!(glob_match("*TEMPERATURE", "S090TEMPERATURE"));
        assert!(glob_match("*TEMPERATURE", "TEMPERATURE"));
        assert!(glob_match("S*", "S"));
        assert!(glob_match("*", ""));
        assert!(glob_match("P*VENT_ZONAL", "P85000VENT_ZONAL"));
        assert!(!glob_match("P*VENT_ZONAL", "P85000VENT_MERID"));
        assert!(glob_match("S*.*", "S001WIND.U.PHYS"));
    }

    #[test]
    fn test_backtracking() {
        assert!(glob_match("*AB*AB", "XABYABAB"));
        assert!(glob_match("a*b*c", "abbbcbc"));
        assert!(!glob_match("a*b*c", "abbbcb"));
        assert!(glob_match("**x", "yyx"));
    }
}
