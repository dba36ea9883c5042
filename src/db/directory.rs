use super::schema::directories;
use super::SQLITE_MAX_PARAMETERS;
use crate::model::{Directory, NewDirectory, NEW_DIRECTORY_FIELD_COUNT};
use ahash::AHashSet;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::debug;

/// Directories never scanned, plus (when `cutoff` is given) those last
/// scanned before it.
pub fn list_unscanned_or_stale(
    connection: &mut SqliteConnection,
    cutoff: Option<NaiveDateTime>,
) -> QueryResult<Vec<Directory>> {
    let mut query = directories::table
        .select(Directory::as_select())
        .order(directories::id)
        .into_boxed();
    query = match cutoff {
        Some(cutoff) => query.filter(
            directories::scanned_dt
                .is_null()
                .or(directories::scanned_dt.lt(cutoff)),
        ),
        None => query.filter(directories::scanned_dt.is_null()),
    };
    query.load(connection)
}

pub fn known_paths(connection: &mut SqliteConnection) -> QueryResult<AHashSet<String>> {
    let paths = directories::table
        .select(directories::path)
        .load::<String>(connection)?;
    Ok(paths.into_iter().collect())
}

/// Insert every path not already registered. The known set is read at call
/// time so repeated calls within one run never insert the same path twice.
pub fn upsert_paths<I, S>(connection: &mut SqliteConnection, paths: I) -> QueryResult<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut known = known_paths(connection)?;
    let new_directories: Vec<NewDirectory> = paths
        .into_iter()
        .filter_map(|path| {
            let path = path.as_ref();
            if known.insert(path.to_string()) {
                Some(NewDirectory {
                    path: path.to_string(),
                })
            } else {
                None
            }
        })
        .collect();

    if new_directories.is_empty() {
        return Ok(0);
    }

    let chunk_size = SQLITE_MAX_PARAMETERS / NEW_DIRECTORY_FIELD_COUNT;
    let mut rows_added = 0;
    for chunk in new_directories.chunks(chunk_size) {
        rows_added += diesel::insert_into(directories::table)
            .values(chunk)
            .execute(connection)?;
    }
    debug!("Registered {} new directories", rows_added);
    Ok(rows_added)
}

pub fn mark_scanned(
    connection: &mut SqliteConnection,
    directory: &Directory,
    at: NaiveDateTime,
) -> QueryResult<()> {
    diesel::update(directories::table.find(directory.id))
        .set(directories::scanned_dt.eq(Some(at)))
        .execute(connection)?;
    Ok(())
}

pub fn find_by_path(
    connection: &mut SqliteConnection,
    path: &str,
) -> QueryResult<Option<Directory>> {
    directories::table
        .filter(directories::path.eq(path))
        .select(Directory::as_select())
        .first(connection)
        .optional()
}

pub fn find_or_create(connection: &mut SqliteConnection, path: &str) -> QueryResult<Directory> {
    if let Some(directory) = find_by_path(connection, path)? {
        return Ok(directory);
    }
    diesel::insert_into(directories::table)
        .values(&NewDirectory {
            path: path.to_string(),
        })
        .execute(connection)?;
    debug!("Created directory {}", path);
    directories::table
        .filter(directories::path.eq(path))
        .select(Directory::as_select())
        .first(connection)
}

pub fn count(connection: &mut SqliteConnection) -> QueryResult<i64> {
    directories::table.count().get_result(connection)
}

pub fn count_unscanned(connection: &mut SqliteConnection) -> QueryResult<i64> {
    directories::table
        .filter(directories::scanned_dt.is_null())
        .count()
        .get_result(connection)
}
