//! Identifier validation and quoting shared by every SQL-building component.

use pg_escape::quote_identifier;

/// Maximum identifier length accepted by `PostgreSQL`.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Check that `name` is a plain SQL identifier: ASCII letters, digits and
/// `_`, not starting with a digit, at most 63 bytes.
///
/// # Errors
///
/// Returns a human-readable reason when the name is rejected.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    let Some(first) = name.chars().next() else {
        return Err("identifier must not be empty".to_string());
    };

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "identifier '{name}' exceeds maximum length of {MAX_IDENTIFIER_LEN} bytes (got {})",
            name.len()
        ));
    }

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(format!(
            "identifier '{name}' must start with a letter or underscore, got '{first}'"
        ));
    }

    if let Some(ch) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(format!("identifier '{name}' contains invalid character '{ch}'"));
    }

    Ok(())
}

/// Quote an optionally schema-qualified table name.
#[must_use]
pub fn quote_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(table)),
        None => quote_identifier(table).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_identifier("VENDORS").is_ok());
        assert!(validate_identifier("_tmp_1").is_ok());
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn rejects_bad_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("a-b").is_err());
        assert!(validate_identifier("x; DROP TABLE y").is_err());
        let err = validate_identifier(&"a".repeat(64)).unwrap_err();
        assert!(err.contains("63"));
    }

    #[test]
    fn quotes_schema_and_table() {
        assert_eq!(quote_table(None, "vendors"), "vendors");
        assert_eq!(quote_table(Some("FINANCE"), "VENDORS"), r#""FINANCE"."VENDORS""#);
    }
}
