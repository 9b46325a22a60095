//! MySQL identifier quoting.

use crate::error::{GatewayError, GatewayResult};

/// Longest identifier part MySQL accepts (tables, columns, databases).
pub const MAX_IDENTIFIER_CHARS: usize = 64;

/// Quote a possibly qualified identifier with backticks.
///
/// `db.table` becomes `` `db`.`table` ``; embedded backticks are doubled.
/// Empty parts, NUL bytes and parts longer than 64 characters are rejected.
pub fn quote_identifier(name: &str) -> GatewayResult<String> {
    if name.is_empty() {
        return Err(GatewayError::validation("Identifier must not be empty"));
    }
    let mut out = String::with_capacity(name.len() + 4);
    for (i, part) in name.split('.').enumerate() {
        validate_part(name, part)?;
        if i > 0 {
            out.push('.');
        }
        out.push('`');
        out.push_str(&part.replace('`', "``"));
        out.push('`');
    }
    Ok(out)
}

fn validate_part(name: &str, part: &str) -> GatewayResult<()> {
    if part.is_empty() {
        return Err(GatewayError::validation(format!(
            "Invalid identifier '{}': empty name part",
            name
        )));
    }
    if part.contains('\0') {
        return Err(GatewayError::validation(format!(
            "Invalid identifier '{}': contains a NUL byte",
            name.escape_default()
        )));
    }
    if part.chars().count() > MAX_IDENTIFIER_CHARS {
        return Err(GatewayError::validation(format!(
            "Invalid identifier '{}': longer than {} characters",
            name, MAX_IDENTIFIER_CHARS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_plain_identifier() {
        assert_eq!(quote_identifier("users").unwrap(), "`users`");
    }

    #[test]
    fn test_qualified_identifier() {
        assert_eq!(quote_identifier("shop.orders").unwrap(), "`shop`.`orders`");
    }

    #[test]
    fn test_backticks_doubled() {
        assert_eq!(quote_identifier("we`ird").unwrap(), "`we``ird`");
        assert_eq!(
            quote_identifier("`; DROP TABLE x; --").unwrap(),
            "```; DROP TABLE x; --`"
        );
    }

    #[test]
    fn test_unicode_and_spaces_allowed() {
        assert_eq!(quote_identifier("prénom client").unwrap(), "`prénom client`");
    }

    #[test]
    fn test_invalid_identifiers() {
        for name in ["", ".", "a..b", ".a", "a.", "a\0b"] {
            let err = quote_identifier(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", name);
        }
    }

    #[test]
    fn test_length_limit_counts_characters() {
        let ok = "é".repeat(MAX_IDENTIFIER_CHARS);
        assert!(quote_identifier(&ok).is_ok());
        let too_long = "a".repeat(MAX_IDENTIFIER_CHARS + 1);
        assert!(quote_identifier(&too_long).is_err());
    }
}
