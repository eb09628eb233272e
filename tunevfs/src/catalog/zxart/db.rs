//! Local mirror of the zxart catalog.

use rusqlite::{params, Connection, Row};

use super::{Author, Party, Track};
use crate::catalog::{Grouping, StoreError};
use crate::vfs::VfsResult;

pub(super) const AUTHOR_TRACKS: Grouping = Grouping::new("author_tracks");
pub(super) const PARTY_TRACKS: Grouping = Grouping::new("party_tracks");

const TRACK_COLUMNS: &str = "tracks._id, tracks.filename, tracks.title, tracks.votes, \
                             tracks.duration, tracks.year, tracks.compo, tracks.partyplace";

/// DDL of the zxart database.
pub(super) fn schema() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS authors (_id INTEGER PRIMARY KEY, nickname TEXT NOT NULL, \
         name TEXT NOT NULL);\
         CREATE TABLE IF NOT EXISTS parties (_id INTEGER PRIMARY KEY, name TEXT NOT NULL, \
         year INTEGER NOT NULL);\
         CREATE TABLE IF NOT EXISTS tracks (_id INTEGER PRIMARY KEY, filename TEXT NOT NULL, \
         title TEXT NOT NULL, votes TEXT NOT NULL, duration TEXT NOT NULL, year INTEGER NOT NULL, \
         compo TEXT NOT NULL, partyplace INTEGER NOT NULL);{}{}",
        AUTHOR_TRACKS.schema(),
        PARTY_TRACKS.schema()
    )
}

pub(super) fn add_author(db: &Connection, author: &Author) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO authors (_id, nickname, name) VALUES (?1, ?2, ?3)",
        params![author.id, author.nickname, author.name],
    )?;
    Ok(())
}

pub(super) fn add_party(db: &Connection, party: &Party) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO parties (_id, name, year) VALUES (?1, ?2, ?3)",
        params![party.id, party.name, party.year],
    )?;
    Ok(())
}

pub(super) fn add_track(db: &Connection, track: &Track) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO tracks (_id, filename, title, votes, duration, year, compo, \
         partyplace) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            track.id,
            track.filename,
            track.title,
            track.votes,
            track.duration,
            track.year,
            track.compo,
            track.party_place
        ],
    )?;
    Ok(())
}

pub(super) fn query_authors(
    db: &Connection,
    visitor: &mut dyn FnMut(Author) -> VfsResult<()>,
) -> VfsResult<usize> {
    let rows = select(
        db,
        "SELECT _id, nickname, name FROM authors ORDER BY nickname COLLATE NOCASE",
        params![],
        author_from_row,
    )?;
    visit_all(rows, visitor)
}

pub(super) fn query_parties(
    db: &Connection,
    visitor: &mut dyn FnMut(Party) -> VfsResult<()>,
) -> VfsResult<usize> {
    let rows = select(
        db,
        "SELECT _id, name, year FROM parties ORDER BY year, name",
        params![],
        party_from_row,
    )?;
    visit_all(rows, visitor)
}

pub(super) fn query_grouped_tracks(
    db: &Connection,
    grouping: Grouping,
    group: u32,
    visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
) -> VfsResult<usize> {
    let sql = format!(
        "SELECT {} FROM tracks WHERE _id IN ({}) ORDER BY tracks._id",
        TRACK_COLUMNS,
        grouping.items_subquery()
    );
    let rows = select(db, &sql, params![group], track_from_row)?;
    visit_all(rows, visitor)
}

pub(super) fn query_top_tracks(
    db: &Connection,
    limit: u32,
    visitor: &mut dyn FnMut(Track) -> VfsResult<()>,
) -> VfsResult<usize> {
    let sql = format!(
        "SELECT {} FROM tracks ORDER BY CAST(votes AS REAL) DESC, tracks._id LIMIT ?1",
        TRACK_COLUMNS
    );
    let rows = select(db, &sql, params![limit], track_from_row)?;
    visit_all(rows, visitor)
}

/// Cached tracks whose filename or title contains `query`, with their author.
pub(super) fn search_tracks(
    db: &Connection,
    query: &str,
    visitor: &mut dyn FnMut(Author, Track) -> VfsResult<()>,
) -> VfsResult<usize> {
    let sql = format!(
        "SELECT authors._id, authors.nickname, authors.name, {} FROM tracks \
         JOIN {} AS g ON g.item_id = tracks._id JOIN authors ON authors._id = g.group_id \
         WHERE tracks.filename || ' ' || tracks.title LIKE '%' || ?1 || '%' \
         ORDER BY authors.nickname COLLATE NOCASE, tracks._id",
        TRACK_COLUMNS,
        AUTHOR_TRACKS.table()
    );
    let rows = select(db, &sql, params![query], |row| {
        Ok((author_from_row(row)?, track_from_row_at(row, 3)?))
    })?;
    let count = rows.len();
    for (author, track) in rows {
        visitor(author, track)?;
    }
    Ok(count)
}

fn select<T>(
    db: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
    map: impl Fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = db.prepare(sql)?;
    let rows = stmt.query_map(params, |row| map(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn visit_all<T>(rows: Vec<T>, visitor: &mut dyn FnMut(T) -> VfsResult<()>) -> VfsResult<usize> {
    let count = rows.len();
    for row in rows {
        visitor(row)?;
    }
    Ok(count)
}

fn author_from_row(row: &Row<'_>) -> rusqlite::Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        nickname: row.get(1)?,
        name: row.get(2)?,
    })
}

fn party_from_row(row: &Row<'_>) -> rusqlite::Result<Party> {
    Ok(Party {
        id: row.get(0)?,
        name: row.get(1)?,
        year: row.get(2)?,
    })
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    track_from_row_at(row, 0)
}

fn track_from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(offset)?,
        filename: row.get(offset + 1)?,
        title: row.get(offset + 2)?,
        votes: row.get(offset + 3)?,
        duration: row.get(offset + 4)?,
        year: row.get(offset + 5)?,
        compo: row.get(offset + 6)?,
        party_place: row.get(offset + 7)?,
    })
}
