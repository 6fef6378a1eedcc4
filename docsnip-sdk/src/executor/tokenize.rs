//! Shell-style splitting of a rendered command line into an argument vector.
//!
//! Supports single quotes (literal), double quotes (with `\"`, `\\`, `\$` and
//! `` \` `` escapes), backslash escapes outside quotes and backslash-newline
//! line continuations. No expansion of any kind is performed.

use super::ExecError;

pub(crate) fn split_command_line(input: &str) -> Result<Vec<String>, ExecError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(ExecError::UnbalancedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => current.push(ch),
                            Some('\n') => {}
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(ExecError::UnbalancedQuote('"')),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(ExecError::UnbalancedQuote('"')),
                    }
                }
            }
            '\\' => match chars.next() {
                // line continuation
                Some('\n') => {}
                Some('\r') if chars.peek() == Some(&'\n') => {
                    chars.next();
                }
                Some(ch) => {
                    in_word = true;
                    current.push(ch);
                }
                None => {}
            },
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        args.push(current);
    }
    Ok(args)
}
