mod descriptor;
mod dialect;
mod query_builder;

pub use descriptor::{
    DeleteDescriptor, DeleteScope, InsertDescriptor, QueryDescriptor, QueryKind, QueryOptions,
    RawDescriptor, SearchDescriptor, SelectDescriptor, UpdateDescriptor, UpdateScope,
};
pub use dialect::Dialect;
pub use query_builder::{QueryBuilder, ScopedQuery, SqlQueryBuilder};
