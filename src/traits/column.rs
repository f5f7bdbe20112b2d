/// Trait representing a database column by name.
///
/// Implemented for `str` and `String` so plain names work wherever a column
/// is expected; schema types can implement it for typed column handles.
pub trait Column {
    /// Returns the column name as it appears in the database.
    fn column_name(&self) -> &str;
}

impl Column for str {
    fn column_name(&self) -> &str {
        self
    }
}

impl Column for String {
    fn column_name(&self) -> &str {
        self
    }
}

impl<C: Column + ?Sized> Column for &C {
    fn column_name(&self) -> &str {
        (**self).column_name()
    }
}
