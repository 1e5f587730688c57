//! `.properties` file parsing
//!
//! Supports the subset used by bulkloader configuration: `#`/`!` comments,
//! `=`, `:` or whitespace separators, trailing-backslash line continuation and
//! the usual backslash escapes.

use std::collections::BTreeMap;
use std::path::Path;

/// Parsed key/value pairs, later keys win
pub type Properties = BTreeMap<String, String>;

pub fn read_properties(path: &Path) -> std::io::Result<Properties> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_properties(&text))
}

pub fn parse_properties(text: &str) -> Properties {
    let mut properties = Properties::new();
    let mut logical = String::new();

    for raw in text.lines() {
        // continuation lines drop their indentation too
        let line = raw.trim_start();

        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }

        if ends_with_continuation(line) {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }

        logical.push_str(line);
        let (key, value) = split_entry(&logical);
        properties.insert(key, value);
        logical.clear();
    }

    if !logical.is_empty() {
        let (key, value) = split_entry(&logical);
        properties.insert(key, value);
    }

    properties
}

/// An odd number of trailing backslashes continues the line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (String, String) {
    let mut key_end = line.len();
    let mut value_start = line.len();
    let mut escaped = false;

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                value_start = i + 1;
                break;
            },
            c if c.is_whitespace() => {
                key_end = i;
                // whitespace may be followed by an explicit separator
                let rest = line[i..].trim_start();
                let offset = line.len() - rest.len();
                value_start = if rest.starts_with('=') || rest.starts_with(':') {
                    offset + 1
                } else {
                    offset
                };
                break;
            },
            _ => {},
        }
    }

    let key = unescape(&line[..key_end]);
    let value = unescape(line[value_start..].trim_start());
    (key, value)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    },
                }
            },
            Some(other) => out.push(other),
            None => {},
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_separators_and_comments() {
        let props = parse_properties(
            "# comment\n! another\n\nimport.target-table=XXX,YYY\nXXX.lock-type : 1\nXXX.locked-operation 3\n",
        );
        assert_eq!(props.len(), 3);
        assert_eq!(props["import.target-table"], "XXX,YYY");
        assert_eq!(props["XXX.lock-type"], "1");
        assert_eq!(props["XXX.locked-operation"], "3");
    }

    #[test]
    fn test_continuation_lines() {
        let props = parse_properties("XXX.target-column=columnA,\\\n    columnB,\\\n    columnC\n");
        assert_eq!(props["XXX.target-column"], "columnA,columnB,columnC");
    }

    #[test]
    fn test_value_keeps_inner_separators() {
        let props = parse_properties("XXX.search-condition=columnA='1' and columnB='2'\n");
        assert_eq!(props["XXX.search-condition"], "columnA='1' and columnB='2'");
    }

    #[test]
    fn test_escapes() {
        let props = parse_properties("a\\=b=c\\td\nkey=\\u0041\n");
        assert_eq!(props["a=b"], "c\td");
        assert_eq!(props["key"], "A");
    }

    #[test]
    fn test_empty_value() {
        let props = parse_properties("XXX.cache-id=\n");
        assert_eq!(props["XXX.cache-id"], "");
    }
}
