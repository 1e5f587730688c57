//! `${name}` variable table
//!
//! The table is passed between cooperating processes as a single string of
//! `key=value` pairs separated by `,`. Backslash escapes `\`, `,` and `=`
//! inside keys and values.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

#[allow(clippy::unwrap_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^{}]*)\}").unwrap());

/// Errors raised while parsing or expanding variables
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariableError {
    #[error("variable is not defined: {0}")]
    Undefined(String),

    #[error("malformed variable entry: {0:?}")]
    Malformed(String),
}

/// Variable name/value table with overwrite-on-redefine semantics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableTable {
    variables: BTreeMap<String, String>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Define every pair from a serialized table, overwriting existing names
    pub fn define_serialized(&mut self, serialized: &str) -> Result<(), VariableError> {
        for entry in split_unescaped(serialized, ',') {
            if entry.is_empty() {
                continue;
            }
            let parts = split_unescaped(&entry, '=');
            if parts.len() != 2 {
                return Err(VariableError::Malformed(entry));
            }
            self.define(unescape(&parts[0]), unescape(&parts[1]));
        }
        Ok(())
    }

    pub fn to_serial_string(&self) -> String {
        self.variables
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Replace every `${name}` in `template`
    ///
    /// In strict mode an undefined name fails the whole expansion, otherwise
    /// the placeholder is kept as written.
    pub fn parse(&self, template: &str, strict: bool) -> Result<String, VariableError> {
        let mut missing = None;
        let expanded = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match self.variables.get(name) {
                Some(value) => value.clone(),
                None => {
                    if strict && missing.is_none() {
                        missing = Some(name.to_string());
                    }
                    caps[0].to_string()
                },
            }
        });

        match missing {
            Some(name) => Err(VariableError::Undefined(name)),
            None => Ok(expanded.into_owned()),
        }
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split on `delimiter` unless it is escaped; escapes are kept in the pieces
fn split_unescaped(raw: &str, delimiter: char) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == delimiter {
            pieces.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    pieces.push(current);
    pieces
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_strict_replaces_all() {
        let mut table = VariableTable::new();
        table.define("user_name", "asakusa");
        table.define("user_pass", "hadoop");

        let result = table
            .parse("columnA='${user_name}' and columnB='${user_pass}'", true)
            .unwrap();
        assert_eq!(result, "columnA='asakusa' and columnB='hadoop'");
    }

    #[test]
    fn test_parse_strict_fails_on_undefined() {
        let mut table = VariableTable::new();
        table.define("user_pass", "hadoop");

        let err = table
            .parse("columnA='${user_name}' and columnB='${user_pass}'", true)
            .unwrap_err();
        assert_eq!(err, VariableError::Undefined("user_name".to_string()));
    }

    #[test]
    fn test_parse_lenient_keeps_placeholder() {
        let mut table = VariableTable::new();
        table.define("user", "dummyuser");

        let result = table.parse("/${user}/${batch}/out", false).unwrap();
        assert_eq!(result, "/dummyuser/${batch}/out");
    }

    #[test]
    fn test_redefine_overwrites() {
        let mut table = VariableTable::new();
        table.define("a", "1");
        table.define("a", "2");
        assert_eq!(table.get("a"), Some("2"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_define_serialized_with_escapes() {
        let mut table = VariableTable::new();
        table
            .define_serialized(r"date=2011\,01\,01,expr=a\=b,path=C:\\tmp")
            .unwrap();
        assert_eq!(table.get("date"), Some("2011,01,01"));
        assert_eq!(table.get("expr"), Some("a=b"));
        assert_eq!(table.get("path"), Some(r"C:\tmp"));
    }

    #[test]
    fn test_define_serialized_rejects_missing_separator() {
        let mut table = VariableTable::new();
        assert!(matches!(
            table.define_serialized("novalue"),
            Err(VariableError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_serialized_string() {
        let mut table = VariableTable::new();
        table.define_serialized("").unwrap();
        assert!(table.is_empty());
    }

    proptest! {
        #[test]
        fn prop_serial_string_restores_table(
            entries in prop::collection::btree_map("[a-z_=,\\\\]{1,8}", "[ -~]{0,12}", 0..6)
        ) {
            let mut table = VariableTable::new();
            for (k, v) in &entries {
                table.define(k.clone(), v.clone());
            }
            let mut restored = VariableTable::new();
            restored.define_serialized(&table.to_serial_string()).unwrap();
            prop_assert_eq!(restored, table);
        }
    }
}
