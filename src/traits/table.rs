/// Trait representing a database table.
/// Implementations are typically written next to the entity they store.
pub trait Table {
    /// Returns the table name as it appears in the database.
    fn table_name() -> &'static str;

    /// Returns the schema name, if any.
    fn schema() -> Option<&'static str> {
        None
    }

    /// Returns the primary key column.
    fn primary_key() -> &'static str {
        "id"
    }

    /// Returns the fully qualified table name (schema.table or just table).
    fn qualified_name() -> String {
        match Self::schema() {
            Some(schema) => format!("{}.{}", schema, Self::table_name()),
            None => Self::table_name().to_string(),
        }
    }
}
