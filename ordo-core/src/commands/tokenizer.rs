// ABOUTME: Splits command text into arguments, honoring quotes and backslash escapes
// ABOUTME: Quoted substrings become a single argument with the quotes removed

fn closing_quote(c: char) -> Option<char> {
    match c {
        '"' => Some('"'),
        '\'' => Some('\''),
        '\u{201C}' => Some('\u{201D}'),
        '\u{2018}' => Some('\u{2019}'),
        _ => None,
    }
}

/// Split `input` into arguments.
///
/// Whitespace separates arguments unless inside quotes. `"`, `'` and their
/// typographic variants open a quoted span that runs to the matching close
/// (or to the end of input if unclosed). A backslash makes the next character
/// literal. An explicitly quoted empty string yields an empty argument.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    // Set once a quote opened, so `""` still produces an argument
    let mut quoted = false;
    let mut in_quotes: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                } else {
                    current.push('\\');
                }
            }
            c if in_quotes == Some(c) => {
                in_quotes = None;
            }
            c if in_quotes.is_none() && closing_quote(c).is_some() => {
                in_quotes = closing_quote(c);
                quoted = true;
            }
            c if in_quotes.is_none() && c.is_whitespace() => {
                if !current.is_empty() || quoted {
                    args.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            _ => {
                current.push(c);
            }
        }
    }

    // Don't forget the last argument
    if !current.is_empty() || quoted {
        args.push(current);
    }

    args
}
