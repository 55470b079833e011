//! Identifier validation and raw-fragment placeholder scanning.

use std::sync::OnceLock;

use regex::Regex;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.([A-Za-z_][A-Za-z0-9_$]*|\*))*$")
            .expect("identifier regex is valid")
    })
}

fn alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(.+?)\s+as\s+(.+)$").expect("alias regex is valid"))
}

/// Returns true if `name` is a plain or dotted identifier (`users.id`, `u.*`).
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    name == "*" || identifier_re().is_match(name)
}

/// Splits `"expr as alias"` into its two halves.
#[must_use]
pub fn split_alias(name: &str) -> Option<(&str, &str)> {
    let caps = alias_re().captures(name)?;
    let expr = caps.get(1)?.as_str().trim();
    let alias = caps.get(2)?.as_str().trim();
    Some((expr, alias))
}

/// Returns true for an identifier that may carry an `AS` alias.
#[must_use]
pub fn is_aliased_identifier(name: &str) -> bool {
    match split_alias(name) {
        Some((expr, alias)) => is_identifier(expr) && identifier_re().is_match(alias),
        None => is_identifier(name),
    }
}

/// Last dotted segment of an identifier, the key it has in a result row.
#[must_use]
pub fn unqualified(name: &str) -> &str {
    match split_alias(name) {
        Some((_, alias)) => alias,
        None => name.rsplit('.').next().unwrap_or(name),
    }
}

/// Counts `?` markers outside single-quoted string literals.
#[must_use]
pub fn count_markers(sql: &str) -> usize {
    let mut in_string = false;
    let mut count = 0;
    for c in sql.chars() {
        match c {
            '\'' => in_string = !in_string,
            '?' if !in_string => count += 1,
            _ => {}
        }
    }
    count
}

/// Rewrites `?` markers outside string literals with `placeholder(n)`,
/// numbering from `start + 1`.
pub fn renumber_markers(sql: &str, start: usize, placeholder: impl Fn(usize) -> String) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_string = false;
    let mut n = start;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                out.push(c);
            }
            '?' if !in_string => {
                n += 1;
                out.push_str(&placeholder(n));
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("id"));
        assert!(is_identifier("users.id"));
        assert!(is_identifier("u.*"));
        assert!(is_identifier("*"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("id; DROP TABLE users"));
        assert!(!is_identifier("name'"));
        assert!(!is_identifier("COUNT(*)"));
    }

    #[test]
    fn test_aliases() {
        assert_eq!(split_alias("users.name as n"), Some(("users.name", "n")));
        assert_eq!(split_alias("email AS contact"), Some(("email", "contact")));
        assert!(is_aliased_identifier("users.name as n"));
        assert!(!is_aliased_identifier("name as n x"));
        assert_eq!(unqualified("users.id"), "id");
        assert_eq!(unqualified("users.id as uid"), "uid");
    }

    #[test]
    fn test_markers_skip_string_literals() {
        assert_eq!(count_markers("a = ? AND b = '?' AND c = ?"), 2);
        let out = renumber_markers("a = ? AND b = '?' AND c = ?", 3, |n| format!("${n}"));
        assert_eq!(out, "a = $4 AND b = '?' AND c = $5");
    }
}
