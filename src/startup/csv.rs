//! Minimal quoted-CSV splitting for command-line tool output.
//!
//! A double quote toggles the "inside quotes" state and is dropped; the
//! delimiter only splits fields outside quotes. Doubled quotes inside a
//! field are not treated as an escape, they just toggle twice.

/// Split one line into fields on `delimiter`, honoring double quotes
pub fn split_quoted(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if c == delimiter && !in_quotes {
            fields.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);
    }

    fields.push(current);
    fields
}

/// Split a comma-separated line
pub fn split_csv_line(line: &str) -> Vec<String> {
    split_quoted(line, ',')
}
