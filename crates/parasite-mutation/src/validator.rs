//! Artifact validation
//!
//! The engine does not check that artifacts are well-formed programs. A
//! validator only guards against the crude breakage that blind appends cause,
//! such as an unclosed brace or string.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unclosed '{open}' opened on line {line}")]
    Unclosed { open: char, line: usize },

    #[error("unexpected '{found}' on line {line}")]
    UnexpectedCloser { found: char, line: usize },

    #[error("expected '{expected}' but found '{found}' on line {line}")]
    Mismatched {
        expected: char,
        found: char,
        line: usize,
    },

    #[error("unterminated string starting on line {line}")]
    UnterminatedString { line: usize },

    #[error("unterminated block comment starting on line {line}")]
    UnterminatedComment { line: usize },
}

/// Pluggable artifact check run after every mutation
pub trait ArtifactValidator: Send + Sync {
    fn validate(&self, artifact: &str) -> Result<(), ValidationError>;
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ArtifactValidator for AcceptAll {
    fn validate(&self, _artifact: &str) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Checks `()`, `[]` and `{}` balance outside strings, chars and comments
///
/// Understands C-family syntax: `//` and nested `/* */` comments, `"..."`
/// strings with escapes, `r#"..."#` raw strings, and char literals as distinct
/// from lifetimes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimiterBalance;

impl ArtifactValidator for DelimiterBalance {
    fn validate(&self, artifact: &str) -> Result<(), ValidationError> {
        let chars: Vec<char> = artifact.chars().collect();
        let mut stack: Vec<(char, usize)> = Vec::new();
        let mut line = 1;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            match c {
                '\n' => line += 1,
                '/' if next == Some('/') => {
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                '/' if next == Some('*') => {
                    let start = line;
                    let mut depth = 1;
                    i += 2;
                    while depth > 0 {
                        match (chars.get(i), chars.get(i + 1)) {
                            (None, _) => return Err(ValidationError::UnterminatedComment { line: start }),
                            (Some('/'), Some('*')) => {
                                depth += 1;
                                i += 2;
                            }
                            (Some('*'), Some('/')) => {
                                depth -= 1;
                                i += 2;
                            }
                            (Some(ch), _) => {
                                if *ch == '\n' {
                                    line += 1;
                                }
                                i += 1;
                            }
                        }
                    }
                    continue;
                }
                'r' if matches!(next, Some('"') | Some('#')) && !ident_char(i.checked_sub(1).map(|p| chars[p])) => {
                    if let Some(end) = raw_string_end(&chars, i + 1, &mut line) {
                        i = end;
                        continue;
                    }
                }
                '"' => {
                    let start = line;
                    i += 1;
                    loop {
                        match chars.get(i) {
                            None => return Err(ValidationError::UnterminatedString { line: start }),
                            Some('\\') => i += 2,
                            Some('"') => break,
                            Some(ch) => {
                                if *ch == '\n' {
                                    line += 1;
                                }
                                i += 1;
                            }
                        }
                    }
                }
                '\'' => {
                    // 'x' or '\n' are chars; 'a without a closing quote is a lifetime
                    if next == Some('\\') {
                        let mut j = i + 2;
                        while j < chars.len() && chars[j] != '\'' && chars[j] != '\n' {
                            j += 1;
                        }
                        i = j;
                    } else if chars.get(i + 2) == Some(&'\'') {
                        i += 2;
                    }
                }
                '(' | '[' | '{' => stack.push((c, line)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        None => return Err(ValidationError::UnexpectedCloser { found: c, line }),
                        Some((open, _)) if open != expected => {
                            return Err(ValidationError::Mismatched {
                                expected: closer_for(open),
                                found: c,
                                line,
                            })
                        }
                        Some(_) => {}
                    }
                }
                _ => {}
            }
            i += 1;
        }

        match stack.pop() {
            Some((open, line)) => Err(ValidationError::Unclosed { open, line }),
            None => Ok(()),
        }
    }
}

fn ident_char(c: Option<char>) -> bool {
    c.map_or(false, |c| c.is_alphanumeric() || c == '_')
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Index just past a raw string whose hashes start at `start`, if one starts there
fn raw_string_end(chars: &[char], start: usize, line: &mut usize) -> Option<usize> {
    let mut i = start;
    let mut hashes = 0;
    while chars.get(i) == Some(&'#') {
        hashes += 1;
        i += 1;
    }
    if chars.get(i) != Some(&'"') {
        return None;
    }
    i += 1;
    while i < chars.len() {
        if chars[i] == '\n' {
            *line += 1;
        }
        if chars[i] == '"' && (0..hashes).all(|k| chars.get(i + 1 + k) == Some(&'#')) {
            return Some(i + 1 + hashes);
        }
        i += 1;
    }
    // unterminated raw strings run to the end
    Some(chars.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(src: &str) -> Result<(), ValidationError> {
        DelimiterBalance.validate(src)
    }

    #[test]
    fn test_balanced_code() {
        assert!(check("fn main() { let v = vec![1, 2]; println!(\"{}\", v[0]); }").is_ok());
    }

    #[test]
    fn test_unclosed_brace() {
        assert_eq!(
            check("fn main() {\n    let x = 1;\n"),
            Err(ValidationError::Unclosed { open: '{', line: 1 })
        );
    }

    #[test]
    fn test_mismatched() {
        assert!(matches!(check("fn f(] {}"), Err(ValidationError::Mismatched { .. })));
        assert!(matches!(check("}"), Err(ValidationError::UnexpectedCloser { .. })));
    }

    #[test]
    fn test_delimiters_in_strings_and_comments_ignored() {
        let src = "// unbalanced ( in comment\n/* and { here /* nested } */ */\nfn f() -> &'static str { \"}{\" }\nlet c = '{';\nlet r = r#\"(\"#;";
        assert!(check(src).is_ok());
    }

    #[test]
    fn test_lifetimes_are_not_chars() {
        assert!(check("fn f<'a>(x: &'a str) -> &'a str { x }").is_ok());
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            check("let s = \"open;"),
            Err(ValidationError::UnterminatedString { line: 1 })
        );
    }

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.validate("}{").is_ok());
    }
}
