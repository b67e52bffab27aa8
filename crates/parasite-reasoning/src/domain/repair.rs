//! Repair of near-JSON model output
//!
//! Rewrites single-quoted strings to double-quoted ones, maps Python literals
//! (`True`, `False`, `None`) to JSON and drops trailing commas. Text inside
//! double-quoted strings is never touched.

#[derive(Clone, Copy, PartialEq)]
enum State {
    Normal,
    Double,
    Single,
}

/// Best-effort conversion of pseudo-JSON into JSON
pub fn repair_quotes(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut state = State::Normal;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Double => {
                out.push(c);
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else if c == '"' {
                    state = State::Normal;
                }
            }
            State::Single => match c {
                '\\' => match chars.next() {
                    Some('\'') => out.push('\''),
                    Some(next) => {
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                '"' => out.push_str("\\\""),
                '\'' => {
                    out.push('"');
                    state = State::Normal;
                }
                _ => out.push(c),
            },
            State::Normal => match c {
                '"' => {
                    out.push('"');
                    state = State::Double;
                }
                '\'' => {
                    out.push('"');
                    state = State::Single;
                }
                ',' => {
                    // Drop the comma when only whitespace separates it from a closer
                    let mut lookahead = chars.clone();
                    let closer = loop {
                        match lookahead.next() {
                            Some(w) if w.is_whitespace() => continue,
                            Some(']') | Some('}') => break true,
                            _ => break false,
                        }
                    };
                    if !closer {
                        out.push(',');
                    }
                }
                c if c.is_ascii_alphabetic() => {
                    let mut word = String::from(c);
                    while let Some(&n) = chars.peek() {
                        if n.is_ascii_alphanumeric() || n == '_' {
                            word.push(n);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push_str(match word.as_str() {
                        "True" => "true",
                        "False" => "false",
                        "None" => "null",
                        other => other,
                    });
                }
                _ => out.push(c),
            },
        }
    }

    out
}
