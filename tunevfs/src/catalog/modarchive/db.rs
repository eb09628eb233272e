//! Local mirror of the modarchive catalog.

use rusqlite::{params, Connection, Row};

use super::{Author, Genre, Track};
use crate::catalog::{Grouping, StoreError};
use crate::vfs::VfsResult;

pub(super) const AUTHOR_TRACKS: Grouping = Grouping::new("author_tracks");
pub(super) const GENRE_TRACKS: Grouping = Grouping::new("genre_tracks");

const TRACK_COLUMNS: &str = "tracks._id, tracks.filename, tracks.title, tracks.size";

pub(super) fn schema() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS authors (_id INTEGER PRIMARY KEY, alias TEXT NOT NULL);\
         CREATE TABLE IF NOT EXISTS genres (_id INTEGER PRIMARY KEY, name TEXT NOT NULL, \
         files INTEGER NOT NULL);\
         CREATE TABLE IF NOT EXISTS tracks (_id INTEGER PRIMARY KEY, filename TEXT NOT NULL, \
         title TEXT NOT NULL, size INTEGER NOT NULL);{}{}",
        AUTHOR_TRACKS.schema(),
        GENRE_TRACKS.schema()
    )
}

pub(super) fn add_author(db: &Connection, author: &Author) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO authors (_id, alias) VALUES (?1, ?2)",
        params![author.id, author.alias],
    )?;
    Ok(())
}

pub(super) fn add_genre(db: &Connection, genre: &Genre) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO genres (_id, name, files) VALUES (?1, ?2, ?3)",
        params![genre.id, genre.name, genre.files],
    )?;
    Ok(())
}

fn add_track(db: &Connection, track: &Track) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO tracks (_id, filename, title, size) VALUES (?1, ?2, ?3, ?4)",
        params![track.id, track.filename, track.title, track.size],
    )?;
    Ok(())
}

pub(super) fn add_author_track(
    db: &Connection,
    author: u32,
    track: &Track,
) -> Result<(), StoreError> {
    add_track(db, track)?;
    AUTHOR_TRACKS.add(db, author, track.id)
}

pub(super) fn add_genre_track(db: &Connection, genre: u32, track: &Track) -> Result<(), StoreError> {
    add_track(db, track)?;
    GENRE_TRACKS.add(db, genre, track.id)
}

pub(super) fn query_authors(
    db: &Connection,
    visitor: &mut dyn FnMut(Author) -> VfsResult<()>,
) -> VfsResult<usize> {
    let mut stmt = db
        .prepare("SELECT _id, alias FROM authors ORDER BY alias COLLATE NOCASE")
        .map_err(StoreError::from)?;
    let authors = stmt
        .query_map([], |row| author_at(row, 0))
        .map_err(StoreError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)?;
    visit_all(authors, visitor)
}

pub(super) fn query_genres(
    db: &Connection,
    visitor: &mut dyn FnMut(Genre) -> VfsResult<()>,
) -> VfsResult<usize> {
    let mut stmt = db
        .prepare("SELECT _id, name, files FROM genres ORDER BY name COLLATE NOCASE")
        .map_err(StoreError::from)?;
    let genres = stmt
        .query_map([], |row| {
            Ok(Genre {
                id: row.get(0)?,
                name: row.get(1)?,
                files: row.get(2)?,
            })
        })
        .map_err(StoreError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)?;
    visit_all(genres, visitor)
}

pub(super) fn query_author_tracks(
    db: &Connection,
    author: u32,
    visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
) -> VfsResult<usize> {
    query_grouped_tracks(db, &AUTHOR_TRACKS, author, visitor)
}

pub(super) fn query_genre_tracks(
    db: &Connection,
    genre: u32,
    visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
) -> VfsResult<usize> {
    query_grouped_tracks(db, &GENRE_TRACKS, genre, visitor)
}

/// Cached tracks whose filename or title contains `query`, with their author.
///
/// Tracks only reached through a genre have no known author and are skipped.
pub(super) fn search_tracks(
    db: &Connection,
    query: &str,
) -> Result<Vec<(Author, Track)>, StoreError> {
    let sql = format!(
        "SELECT authors._id, authors.alias, {columns} FROM tracks \
         JOIN {table} ON {table}.item_id = tracks._id \
         JOIN authors ON authors._id = {table}.group_id \
         WHERE tracks.filename LIKE '%' || ?1 || '%' OR tracks.title LIKE '%' || ?1 || '%' \
         ORDER BY authors.alias COLLATE NOCASE, tracks._id",
        columns = TRACK_COLUMNS,
        table = AUTHOR_TRACKS.table()
    );
    let mut stmt = db.prepare(&sql)?;
    let found = stmt
        .query_map(params![query], |row| Ok((author_at(row, 0)?, track_at(row, 2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(found)
}

fn query_grouped_tracks(
    db: &Connection,
    grouping: &Grouping,
    group: u32,
    visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
) -> VfsResult<usize> {
    let sql = format!(
        "SELECT {} FROM tracks WHERE _id IN ({}) ORDER BY filename COLLATE NOCASE",
        TRACK_COLUMNS,
        grouping.items_subquery()
    );
    let mut stmt = db.prepare(&sql).map_err(StoreError::from)?;
    let tracks = stmt
        .query_map(params![group], |row| track_at(row, 0))
        .map_err(StoreError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)?;
    visit_all(tracks, visitor)
}

fn visit_all<T>(items: Vec<T>, visitor: &mut dyn FnMut(T) -> VfsResult<()>) -> VfsResult<usize> {
    let count = items.len();
    for item in items {
        visitor(item)?;
    }
    Ok(count)
}

fn author_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Author> {
    Ok(Author {
        id: row.get(offset)?,
        alias: row.get(offset + 1)?,
    })
}

fn track_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(offset)?,
        filename: row.get(offset + 1)?,
        title: row.get(offset + 2)?,
        size: row.get(offset + 3)?,
    })
}
