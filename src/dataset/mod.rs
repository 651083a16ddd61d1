pub mod io;
pub mod models;
pub mod schema;
