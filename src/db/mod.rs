pub mod postgres;

pub use postgres::create_pool;
pub use postgres::init_schema;
