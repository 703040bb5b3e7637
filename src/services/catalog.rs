//! Catalog queries used by the upload and deletion flows.
//!
//! Every function takes a plain connection so callers decide whether it
//! runs inside a transaction.

use crate::models::catalog::{Album, Artist, Song};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

const SONG_COLUMNS: &str = "songs.id, songs.title, songs.album_id, songs.file_path, \
     songs.cover_art, songs.duration, songs.track_number, songs.genre, songs.year, \
     songs.uploaded_by, songs.created_at";

/// Fields of a song row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewSong<'a> {
    pub title: &'a str,
    pub album_id: Option<i64>,
    pub file_path: &'a str,
    pub cover_art: Option<&'a str>,
    pub duration: Option<i64>,
    pub track_number: Option<i64>,
    pub genre: Option<&'a str>,
    pub year: Option<i64>,
    pub uploaded_by: &'a str,
}

pub async fn find_song_by_file_path(
    conn: &mut SqliteConnection,
    file_path: &str,
) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM songs WHERE file_path = ? LIMIT 1")
        .bind(file_path)
        .fetch_optional(conn)
        .await
}

/// Id of the artist `name` created by `user_id`, inserting it if missing.
///
/// Inserting first means a concurrent writer that created the row already
/// turns the insert into a no-op instead of a constraint violation.
pub async fn find_or_create_artist(
    conn: &mut SqliteConnection,
    name: &str,
    user_id: &str,
) -> sqlx::Result<i64> {
    sqlx::query(
        "INSERT INTO artists (name, image_url, created_by, created_at)
         VALUES (?, NULL, ?, ?)
         ON CONFLICT (name, created_by) DO NOTHING",
    )
    .bind(name)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    sqlx::query_scalar::<_, i64>("SELECT id FROM artists WHERE name = ? AND created_by = ?")
        .bind(name)
        .bind(user_id)
        .fetch_one(conn)
        .await
}

pub async fn find_or_create_album(
    conn: &mut SqliteConnection,
    name: &str,
    artist_id: i64,
    user_id: &str,
) -> sqlx::Result<Album> {
    sqlx::query(
        "INSERT INTO albums (name, artist_id, cover_art, created_by, created_at)
         VALUES (?, ?, NULL, ?, ?)
         ON CONFLICT (name, artist_id, created_by) DO NOTHING",
    )
    .bind(name)
    .bind(artist_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    sqlx::query_as::<_, Album>(
        "SELECT id, name, artist_id, cover_art, created_by, created_at
         FROM albums WHERE name = ? AND artist_id = ? AND created_by = ?",
    )
    .bind(name)
    .bind(artist_id)
    .bind(user_id)
    .fetch_one(conn)
    .await
}

pub async fn insert_song(conn: &mut SqliteConnection, song: &NewSong<'_>) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO songs (title, album_id, file_path, cover_art, duration, track_number,
                            genre, year, uploaded_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(song.title)
    .bind(song.album_id)
    .bind(song.file_path)
    .bind(song.cover_art)
    .bind(song.duration)
    .bind(song.track_number)
    .bind(song.genre)
    .bind(song.year)
    .bind(song.uploaded_by)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

pub async fn link_song_artist(
    conn: &mut SqliteConnection,
    song_id: i64,
    artist_id: i64,
) -> sqlx::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO song_artists (song_id, artist_id) VALUES (?, ?)")
        .bind(song_id)
        .bind(artist_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Set album artwork only if the album has none yet.
pub async fn backfill_album_cover(
    conn: &mut SqliteConnection,
    album_id: i64,
    cover_art: &str,
) -> sqlx::Result<bool> {
    let result =
        sqlx::query("UPDATE albums SET cover_art = ? WHERE id = ? AND cover_art IS NULL")
            .bind(cover_art)
            .bind(album_id)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_song(conn: &mut SqliteConnection, song_id: i64) -> sqlx::Result<Option<Song>> {
    sqlx::query_as::<_, Song>(&format!("SELECT {} FROM songs WHERE id = ?", SONG_COLUMNS))
        .bind(song_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_album(
    conn: &mut SqliteConnection,
    album_id: i64,
) -> sqlx::Result<Option<Album>> {
    sqlx::query_as::<_, Album>(
        "SELECT id, name, artist_id, cover_art, created_by, created_at
         FROM albums WHERE id = ?",
    )
    .bind(album_id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_artist(
    conn: &mut SqliteConnection,
    artist_id: i64,
) -> sqlx::Result<Option<Artist>> {
    sqlx::query_as::<_, Artist>(
        "SELECT id, name, image_url, created_by, created_at FROM artists WHERE id = ?",
    )
    .bind(artist_id)
    .fetch_optional(conn)
    .await
}

pub async fn songs_in_album(
    conn: &mut SqliteConnection,
    album_id: i64,
) -> sqlx::Result<Vec<Song>> {
    sqlx::query_as::<_, Song>(&format!(
        "SELECT {} FROM songs WHERE album_id = ? ORDER BY id",
        SONG_COLUMNS
    ))
    .bind(album_id)
    .fetch_all(conn)
    .await
}

/// Songs credited to the artist or sitting on one of the artist's albums.
pub async fn songs_for_artist(
    conn: &mut SqliteConnection,
    artist_id: i64,
) -> sqlx::Result<Vec<Song>> {
    sqlx::query_as::<_, Song>(&format!(
        "SELECT {} FROM songs
         WHERE songs.id IN (SELECT song_id FROM song_artists WHERE artist_id = ?)
            OR songs.album_id IN (SELECT id FROM albums WHERE artist_id = ?)
         ORDER BY songs.id",
        SONG_COLUMNS
    ))
    .bind(artist_id)
    .bind(artist_id)
    .fetch_all(conn)
    .await
}

pub async fn albums_for_artist(
    conn: &mut SqliteConnection,
    artist_id: i64,
) -> sqlx::Result<Vec<Album>> {
    sqlx::query_as::<_, Album>(
        "SELECT id, name, artist_id, cover_art, created_by, created_at
         FROM albums WHERE artist_id = ? ORDER BY id",
    )
    .bind(artist_id)
    .fetch_all(conn)
    .await
}

/// `DELETE FROM {table} WHERE {column} IN (...)`, returning rows affected.
async fn delete_where_in(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    ids: &[i64],
) -> sqlx::Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder =
        QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE {} IN (", table, column));
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// Delete songs and every row that depends on them, in dependency order:
/// listens, playlist memberships, artist links, then the songs.
pub async fn delete_songs(conn: &mut SqliteConnection, song_ids: &[i64]) -> sqlx::Result<u64> {
    delete_where_in(&mut *conn, "song_listens", "song_id", song_ids).await?;
    delete_where_in(&mut *conn, "playlist_songs", "song_id", song_ids).await?;
    delete_where_in(&mut *conn, "song_artists", "song_id", song_ids).await?;
    delete_where_in(conn, "songs", "id", song_ids).await
}

pub async fn delete_albums(conn: &mut SqliteConnection, album_ids: &[i64]) -> sqlx::Result<u64> {
    delete_where_in(conn, "albums", "id", album_ids).await
}

pub async fn delete_artists(conn: &mut SqliteConnection, artist_ids: &[i64]) -> sqlx::Result<u64> {
    delete_where_in(conn, "artists", "id", artist_ids).await
}

/// Albums with no remaining songs.
pub async fn orphan_albums(conn: &mut SqliteConnection) -> sqlx::Result<Vec<Album>> {
    sqlx::query_as::<_, Album>(
        "SELECT id, name, artist_id, cover_art, created_by, created_at FROM albums
         WHERE NOT EXISTS (SELECT 1 FROM songs WHERE songs.album_id = albums.id)",
    )
    .fetch_all(conn)
    .await
}

/// Artists no song is credited to and no album is attributed to.
pub async fn orphan_artists(conn: &mut SqliteConnection) -> sqlx::Result<Vec<Artist>> {
    sqlx::query_as::<_, Artist>(
        "SELECT id, name, image_url, created_by, created_at FROM artists
         WHERE NOT EXISTS (SELECT 1 FROM song_artists WHERE song_artists.artist_id = artists.id)
           AND NOT EXISTS (SELECT 1 FROM albums WHERE albums.artist_id = artists.id)",
    )
    .fetch_all(conn)
    .await
}

/// Whether any remaining row still points at `locator`.
pub async fn locator_in_use(conn: &mut SqliteConnection, locator: &str) -> sqlx::Result<bool> {
    let hits = sqlx::query_scalar::<_, i64>(
        "SELECT EXISTS (SELECT 1 FROM songs WHERE file_path = ?1 OR cover_art = ?1)
             OR EXISTS (SELECT 1 FROM albums WHERE cover_art = ?1)
             OR EXISTS (SELECT 1 FROM artists WHERE image_url = ?1)",
    )
    .bind(locator)
    .fetch_one(conn)
    .await?;
    Ok(hits != 0)
}
