mod column;
mod driver;
mod table;

pub use column::Column;
pub use driver::{DatabaseConnection, DatabaseDriver};
pub use table::Table;
