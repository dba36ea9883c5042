pub mod directory;
pub mod file;
pub mod file_event;
pub mod schema;
pub mod sqlite;

pub use sqlite::{establish_connection, establish_in_memory, SQLITE_MAX_PARAMETERS};
