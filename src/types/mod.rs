mod param;
mod row;
mod sql_value;
mod value_map;

pub use param::{BoundParameter, ParamType, StorageValue};
pub use row::{QueryResult, RawQueryResult, Row};
pub use sql_value::SqlValue;
pub use value_map::ValueMap;
