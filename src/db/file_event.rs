use super::schema::file_events;
use crate::model::{File, FileEvent};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

// Events are appended by `file::apply_outcome` only; nothing here mutates.

pub fn events_for_file(
    connection: &mut SqliteConnection,
    file: &File,
) -> QueryResult<Vec<FileEvent>> {
    file_events::table
        .filter(file_events::file_id.eq(file.id))
        .order(file_events::id)
        .select(FileEvent::as_select())
        .load(connection)
}

pub fn count(connection: &mut SqliteConnection) -> QueryResult<i64> {
    file_events::table.count().get_result(connection)
}

pub fn count_by_type(connection: &mut SqliteConnection) -> QueryResult<Vec<(String, i64)>> {
    file_events::table
        .group_by(file_events::event_type)
        .select((file_events::event_type, diesel::dsl::count_star()))
        .order(file_events::event_type)
        .load(connection)
}
