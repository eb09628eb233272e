//! Local mirror of the zxtunes catalog.

use rusqlite::{params, Connection, Row};

use super::{Author, Track};
use crate::catalog::{Grouping, StoreError};
use crate::vfs::VfsResult;

pub(super) const AUTHOR_TRACKS: Grouping = Grouping::new("author_tracks");

pub(super) fn schema() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS authors (_id INTEGER PRIMARY KEY, nickname TEXT NOT NULL, \
         name TEXT NOT NULL);\
         CREATE TABLE IF NOT EXISTS tracks (_id INTEGER PRIMARY KEY, filename TEXT NOT NULL, \
         title TEXT NOT NULL, duration INTEGER NOT NULL, date INTEGER NOT NULL);{}",
        AUTHOR_TRACKS.schema()
    )
}

pub(super) fn add_author(db: &Connection, author: &Author) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO authors (_id, nickname, name) VALUES (?1, ?2, ?3)",
        params![author.id, author.nickname, author.name],
    )?;
    Ok(())
}

pub(super) fn add_author_track(
    db: &Connection,
    author: u32,
    track: &Track,
) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO tracks (_id, filename, title, duration, date) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            track.id,
            track.filename,
            track.title,
            track.duration_frames,
            track.date
        ],
    )?;
    AUTHOR_TRACKS.add(db, author, track.id)
}

pub(super) fn query_authors(
    db: &Connection,
    visitor: &mut dyn FnMut(Author) -> VfsResult<()>,
) -> VfsResult<usize> {
    let mut stmt = db
        .prepare("SELECT _id, nickname, name FROM authors ORDER BY nickname COLLATE NOCASE")
        .map_err(StoreError::from)?;
    let authors = stmt
        .query_map([], |row| author_at(row, 0))
        .map_err(StoreError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)?;
    let count = authors.len();
    for author in authors {
        visitor(author)?;
    }
    Ok(count)
}

pub(super) fn query_author_tracks(
    db: &Connection,
    author: u32,
    visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
) -> VfsResult<usize> {
    let sql = format!(
        "SELECT _id, filename, title, duration, date FROM tracks WHERE _id IN ({}) ORDER BY _id",
        AUTHOR_TRACKS.items_subquery()
    );
    let mut stmt = db.prepare(&sql).map_err(StoreError::from)?;
    let tracks = stmt
        .query_map(params![author], |row| track_at(row, 0))
        .map_err(StoreError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)?;
    let count = tracks.len();
    for track in tracks {
        visitor(track)?;
    }
    Ok(count)
}

/// Cached tracks whose filename or title contains `query`, with their author.
pub(super) fn search_tracks(
    db: &Connection,
    query: &str,
) -> Result<Vec<(Author, Track)>, StoreError> {
    let sql = format!(
        "SELECT authors._id, authors.nickname, authors.name, tracks._id, tracks.filename, \
         tracks.title, tracks.duration, tracks.date FROM tracks \
         JOIN {table} ON {table}.item_id = tracks._id \
         JOIN authors ON authors._id = {table}.group_id \
         WHERE tracks.filename LIKE '%' || ?1 || '%' OR tracks.title LIKE '%' || ?1 || '%' \
         ORDER BY authors.nickname COLLATE NOCASE, tracks._id",
        table = AUTHOR_TRACKS.table()
    );
    let mut stmt = db.prepare(&sql)?;
    let found = stmt
        .query_map(params![query], |row| Ok((author_at(row, 0)?, track_at(row, 3)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(found)
}

fn author_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Author> {
    Ok(Author {
        id: row.get(offset)?,
        nickname: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
    })
}

fn track_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(offset)?,
        filename: row.get(offset + 1)?,
        title: row.get(offset + 2)?,
        duration_frames: row.get(offset + 3)?,
        date: row.get(offset + 4)?,
    })
}
