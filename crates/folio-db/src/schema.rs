//! Schema name validation for `search_path` scoping.

use folio_core::{Error, Result};

const RESERVED: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

/// Validate a PostgreSQL schema name before it is interpolated into SQL.
///
/// Accepts 1-63 ASCII alphanumerics/underscores, not starting with a digit,
/// and not a system schema.
///
/// ```
/// use folio_db::validate_schema_name;
///
/// assert!(validate_schema_name("test_0a1b").is_ok());
/// assert!(validate_schema_name("1bad").is_err());
/// assert!(validate_schema_name("x; DROP TABLE collection").is_err());
/// ```
pub fn validate_schema_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 63 {
        return Err(Error::InvalidInput(format!(
            "Schema name must be 1-63 characters: {:?}",
            name
        )));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!(
            "Schema name must not start with a digit: {:?}",
            name
        )));
    }
    if let Some(bad) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(Error::InvalidInput(format!(
            "Schema name contains invalid character: {:?}",
            bad
        )));
    }
    if RESERVED.contains(&name.to_lowercase().as_str()) || name.starts_with("pg_") {
        return Err(Error::InvalidInput(format!("Schema name is reserved: {}", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_schema_name("public").is_ok());
        assert!(validate_schema_name("_private").is_ok());
        assert!(validate_schema_name("test_6f2c9a").is_ok());
    }

    #[test]
    fn test_rejects_injection_and_bad_shapes() {
        assert!(validate_schema_name("").is_err());
        assert!(validate_schema_name(&"a".repeat(64)).is_err());
        assert!(validate_schema_name("9lives").is_err());
        assert!(validate_schema_name("a-b").is_err());
        assert!(validate_schema_name("a;drop").is_err());
    }

    #[test]
    fn test_rejects_system_schemas() {
        assert!(validate_schema_name("pg_catalog").is_err());
        assert!(validate_schema_name("INFORMATION_SCHEMA").is_err());
        assert!(validate_schema_name("pg_temp_1").is_err());
    }
}
