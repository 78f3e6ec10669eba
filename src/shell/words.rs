//! POSIX-style word splitting for command lines.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("No closing quotation")]
    UnterminatedQuote,

    #[error("No escaped character")]
    TrailingEscape,
}

/// Split `line` into words. Single quotes are literal; inside double quotes
/// a backslash escapes `"`, `\`, `$` and `` ` ``; outside quotes it escapes
/// any character.
pub fn split(line: &str) -> Result<Vec<String>, SplitError> {
    enum Mode {
        Plain,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut mode = Mode::Plain;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match mode {
            Mode::Plain => match ch {
                ' ' | '\t' | '\n' | '\r' => {
                    if in_word {
                        words.push(std::mem::take(&mut word));
                        in_word = false;
                    }
                }
                '\'' => {
                    mode = Mode::Single;
                    in_word = true;
                }
                '"' => {
                    mode = Mode::Double;
                    in_word = true;
                }
                '\\' => {
                    let escaped = chars.next().ok_or(SplitError::TrailingEscape)?;
                    word.push(escaped);
                    in_word = true;
                }
                other => {
                    word.push(other);
                    in_word = true;
                }
            },
            Mode::Single => match ch {
                '\'' => mode = Mode::Plain,
                other => word.push(other),
            },
            Mode::Double => match ch {
                '"' => mode = Mode::Plain,
                '\\' => {
                    let escaped = chars.next().ok_or(SplitError::UnterminatedQuote)?;
                    if !matches!(escaped, '"' | '\\' | '$' | '`') {
                        word.push('\\');
                    }
                    word.push(escaped);
                }
                other => word.push(other),
            },
        }
    }

    match mode {
        Mode::Plain => {
            if in_word {
                words.push(word);
            }
            Ok(words)
        }
        Mode::Single | Mode::Double => Err(SplitError::UnterminatedQuote),
    }
}
