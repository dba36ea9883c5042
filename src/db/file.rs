use super::schema::{file_events, files};
use super::SQLITE_MAX_PARAMETERS;
use crate::model::{
    Directory, File, FileStatus, NewFile, NewFileEvent, Outcome, NEW_FILE_FIELD_COUNT,
};
use ahash::AHashSet;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::debug;

/// Snapshot of every tracked archive filename.
pub fn known_filenames(connection: &mut SqliteConnection) -> QueryResult<AHashSet<String>> {
    let names = files::table
        .select(files::archive_filename)
        .load::<String>(connection)?;
    Ok(names.into_iter().collect())
}

/// Bulk-insert `filenames` as `discovered` under `directory`, skipping any
/// name already in `known`. Inserted names are added to `known`, so the same
/// snapshot can be reused across directories within a run.
pub fn register_discovered(
    connection: &mut SqliteConnection,
    directory: &Directory,
    filenames: &[String],
    known: &mut AHashSet<String>,
) -> QueryResult<usize> {
    let new_files: Vec<NewFile> = filenames
        .iter()
        .filter(|name| !known.contains(name.as_str()))
        .map(|name| NewFile {
            archive_filename: name.clone(),
            parent_directory: directory.id,
            status: FileStatus::Discovered.as_str().to_string(),
        })
        .collect();

    // The listing itself may repeat a name.
    let mut seen = AHashSet::with_capacity(new_files.len());
    let new_files: Vec<NewFile> = new_files
        .into_iter()
        .filter(|file| seen.insert(file.archive_filename.clone()))
        .collect();

    if new_files.is_empty() {
        return Ok(0);
    }

    let chunk_size = SQLITE_MAX_PARAMETERS / NEW_FILE_FIELD_COUNT;
    let mut rows_added = 0;
    for chunk in new_files.chunks(chunk_size) {
        rows_added += diesel::insert_into(files::table)
            .values(chunk)
            .execute(connection)?;
    }
    known.extend(seen);
    debug!(
        directory = %directory.path,
        "Registered {} discovered files", rows_added
    );
    Ok(rows_added)
}

/// Files whose status is not in `exclude`, optionally scoped to one
/// directory and capped at `limit` rows.
pub fn pending(
    connection: &mut SqliteConnection,
    exclude: &[FileStatus],
    parent: Option<&Directory>,
    limit: Option<i64>,
) -> QueryResult<Vec<File>> {
    let excluded: Vec<&str> = exclude.iter().map(|status| status.as_str()).collect();
    let mut query = files::table
        .select(File::as_select())
        .filter(files::status.ne_all(excluded))
        .order(files::id)
        .into_boxed();
    if let Some(parent) = parent {
        query = query.filter(files::parent_directory.eq(parent.id));
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    query.load(connection)
}

/// Record a batch outcome: status (and xml filename on success) plus the
/// matching audit event, in one transaction.
pub fn apply_outcome(
    connection: &mut SqliteConnection,
    file: &File,
    outcome: &Outcome,
    at: NaiveDateTime,
) -> QueryResult<()> {
    connection.transaction(|connection| {
        let target = files::table.find(file.id);
        let updated = match outcome {
            Outcome::Downloaded { xml_filename } => diesel::update(target)
                .set((
                    files::status.eq(FileStatus::Downloaded.as_str()),
                    files::xml_filename.eq(Some(xml_filename.as_str())),
                ))
                .execute(connection)?,
            Outcome::Error => diesel::update(target)
                .set(files::status.eq(FileStatus::Error.as_str()))
                .execute(connection)?,
        };
        if updated == 0 {
            return Err(diesel::result::Error::NotFound);
        }

        diesel::insert_into(file_events::table)
            .values(&NewFileEvent {
                file_id: file.id,
                event_type: outcome.event_type().to_string(),
                event_dt: at,
            })
            .execute(connection)?;
        Ok(())
    })
}

pub fn find_by_name(connection: &mut SqliteConnection, name: &str) -> QueryResult<Option<File>> {
    files::table
        .filter(files::archive_filename.eq(name))
        .select(File::as_select())
        .first(connection)
        .optional()
}

pub fn files_in_directory(
    connection: &mut SqliteConnection,
    directory: &Directory,
) -> QueryResult<Vec<File>> {
    files::table
        .filter(files::parent_directory.eq(directory.id))
        .order(files::id)
        .select(File::as_select())
        .load(connection)
}

pub fn count(connection: &mut SqliteConnection) -> QueryResult<i64> {
    files::table.count().get_result(connection)
}

/// `(status, count)` pairs, alphabetical by status.
pub fn count_by_status(connection: &mut SqliteConnection) -> QueryResult<Vec<(String, i64)>> {
    files::table
        .group_by(files::status)
        .select((files::status, diesel::dsl::count_star()))
        .order(files::status)
        .load(connection)
}
