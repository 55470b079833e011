#![allow(dead_code)]

use quarry_core::dialect::Driver;

pub const ALL_DRIVERS: [Driver; 4] = [
    Driver::Sqlite,
    Driver::Postgres,
    Driver::MySql,
    Driver::SqlServer,
];

/// Counts placeholders outside single-quoted literals.
pub fn count_placeholders(sql: &str, driver: Driver) -> usize {
    let mut in_string = false;
    let mut count = 0;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => in_string = !in_string,
            _ if in_string => {}
            '?' if matches!(driver, Driver::Sqlite | Driver::MySql) => count += 1,
            '$' if driver == Driver::Postgres => {
                if chars.peek().is_some_and(char::is_ascii_digit) {
                    count += 1;
                }
            }
            '@' if driver == Driver::SqlServer => {
                if chars.peek() == Some(&'p') {
                    count += 1;
                }
            }
            _ => {}
        }
    }
    count
}

/// Placeholders in order of appearance, for the numbered styles.
pub fn numbered_placeholders(sql: &str, prefix: &str) -> Vec<usize> {
    sql.match_indices(prefix)
        .filter_map(|(i, _)| {
            let digits: String = sql[i + prefix.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        })
        .collect()
}
