use thiserror::Error;

pub const DEFAULT_SCHEMA: &str = "public";

const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableNameError {
    #[error("schema name is empty")]
    Empty,
    #[error("schema name {0:?} is longer than 63 bytes")]
    TooLong(String),
    #[error("schema name {0:?} must match [a-z_][a-z0-9_]*")]
    InvalidCharacters(String),
}

/// Schema-qualified names of the two tables the pass reads and writes.
///
/// Table names cannot be bound as statement parameters, so the schema is
/// restricted to plain lower-case identifiers before it is spliced into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketTables {
    schema: String,
    tickets: String,
    raw_ticket_batches: String,
}

impl TicketTables {
    pub fn in_schema(schema: &str) -> Result<Self, TableNameError> {
        let schema = validate_identifier(schema)?;
        Ok(Self {
            tickets: format!("{schema}.tickets"),
            raw_ticket_batches: format!("{schema}.raw_ticket_batches"),
            schema: schema.to_string(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn tickets(&self) -> &str {
        &self.tickets
    }

    pub fn raw_ticket_batches(&self) -> &str {
        &self.raw_ticket_batches
    }
}

impl Default for TicketTables {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            tickets: format!("{DEFAULT_SCHEMA}.tickets"),
            raw_ticket_batches: format!("{DEFAULT_SCHEMA}.raw_ticket_batches"),
        }
    }
}

fn validate_identifier(raw: &str) -> Result<&str, TableNameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(TableNameError::Empty);
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(TableNameError::TooLong(name.to_string()));
    }

    let mut bytes = name.bytes();
    let head_ok = bytes
        .next()
        .is_some_and(|b| b.is_ascii_lowercase() || b == b'_');
    let tail_ok = bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if !(head_ok && tail_ok) {
        return Err(TableNameError::InvalidCharacters(name.to_string()));
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_live_in_public() {
        let tables = TicketTables::default();
        assert_eq!(tables.tickets(), "public.tickets");
        assert_eq!(tables.raw_ticket_batches(), "public.raw_ticket_batches");
        assert_eq!(TicketTables::in_schema("public").unwrap(), tables);
    }

    #[test]
    fn qualifies_with_custom_schema() {
        let tables = TicketTables::in_schema(" racing_2018 ").unwrap();
        assert_eq!(tables.schema(), "racing_2018");
        assert_eq!(tables.tickets(), "racing_2018.tickets");
    }

    #[test]
    fn rejects_unsafe_schema_names() {
        assert_eq!(TicketTables::in_schema(""), Err(TableNameError::Empty));
        for bad in ["Public", "1racing", "racing;drop", "ra cing", "\"quoted\""] {
            assert!(
                matches!(
                    TicketTables::in_schema(bad),
                    Err(TableNameError::InvalidCharacters(_))
                ),
                "{bad} should be rejected"
            );
        }
        let long = "a".repeat(64);
        assert!(matches!(
            TicketTables::in_schema(&long),
            Err(TableNameError::TooLong(_))
        ));
    }
}
