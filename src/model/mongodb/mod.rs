mod bson;
mod collection;
pub mod errors;

pub use bson::{bson_datetime_option, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
