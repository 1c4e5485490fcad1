#![forbid(unsafe_code)]
//! Shell quoting for launch-command synthesis.

/// Single-quote a value for POSIX shells. Embedded single quotes use the
/// `'"'"'` escape so the result survives nested interpolation.
pub fn shell_quote(value: &str) -> String {
    if value.trim().is_empty() {
        return "''".to_string();
    }
    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_values() {
        assert_eq!(shell_quote("/tmp/work dir"), "'/tmp/work dir'");
    }

    #[test]
    fn escapes_embedded_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn empty_becomes_empty_quotes() {
        assert_eq!(shell_quote("  "), "''");
    }
}
