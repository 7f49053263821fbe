//! Pattern matching for `LIKE`.
//!
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//! - `\` escapes the next character
//!
//! Matching is case-sensitive and operates on Unicode scalar values.

#[derive(Clone, Debug, PartialEq)]
enum LikeToken {
    AnySequence,
    AnyChar,
    Literal(char),
}

/// A compiled LIKE pattern.
#[derive(Clone, Debug)]
pub struct LikePattern {
    tokens: Vec<LikeToken>,
}

impl LikePattern {
    pub fn new(pattern: &str) -> Self {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            let token = match c {
                '%' => LikeToken::AnySequence,
                '_' => LikeToken::AnyChar,
                '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
                c => LikeToken::Literal(c),
            };
            // Consecutive `%` are redundant.
            if token == LikeToken::AnySequence && tokens.last() == Some(&LikeToken::AnySequence) {
                continue;
            }
            tokens.push(token);
        }
        Self { tokens }
    }

    /// Matches the whole of `value`.
    ///
    /// Row `i` of the table holds whether the first `i` pattern tokens can
    /// consume the value prefix, computed one value character at a time.
    pub fn matches(&self, value: &str) -> bool {
        let n = self.tokens.len();
        let mut reachable = vec![false; n + 1];
        reachable[0] = true;
        for i in 0..n {
            if self.tokens[i] == LikeToken::AnySequence && reachable[i] {
                reachable[i + 1] = true;
            }
        }
        for c in value.chars() {
            let mut next = vec![false; n + 1];
            for i in (0..n).filter(|&i| reachable[i]) {
                match self.tokens[i] {
                    LikeToken::AnySequence => {
                        next[i] = true;
                        next[i + 1] = true;
                    }
                    LikeToken::AnyChar => next[i + 1] = true,
                    LikeToken::Literal(l) => {
                        if l == c {
                            next[i + 1] = true;
                        }
                    }
                }
            }
            // A `%` reached after consuming `c` may also match empty.
            for i in 0..n {
                if next[i] && self.tokens[i] == LikeToken::AnySequence {
                    next[i + 1] = true;
                }
            }
            reachable = next;
        }
        reachable[n]
    }
}

/// SQL LIKE pattern matching.
///
/// ```
/// use tabula_core::pattern_match::like;
/// assert!(like("hello", "h%o"));
/// assert!(like("hello", "_ello"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    LikePattern::new(pattern).matches(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_exact() {
        assert!(like("hello", "hello"));
        assert!(!like("hello", "hell"));
        assert!(!like("hello", "world"));
    }

    #[test]
    fn like_wildcards() {
        assert!(like("hello", "%"));
        assert!(like("hello", "h%o"));
        assert!(like("hello", "%ell%"));
        assert!(like("hello", "h%%o"));
        assert!(like("hello", "h_llo"));
        assert!(!like("hello", "______"));
        assert!(like("hello world", "%world"));
        assert!(like("aaa", "%a"));
        assert!(!like("aab", "%a"));
    }

    #[test]
    fn like_escape() {
        assert!(like("50%", "50\\%"));
        assert!(!like("500", "50\\%"));
        assert!(like("a_b", "a\\_b"));
    }

    #[test]
    fn like_empty() {
        assert!(like("", ""));
        assert!(like("", "%"));
        assert!(!like("", "_"));
    }
}
