//! Integration tests for chunked image uploads and song ingestion.

mod common;

use common::{TestLibrary, artwork, audio, base64_parts, metadata, song};
use media_library::{
    models::upload::{ChunkRequest, UploadRole},
    services::{error::LibraryError, sweeper::Sweep, upload_registry::SessionLimits},
};

fn chunk(upload_id: &str, index: u32, parts: &[String], role: UploadRole) -> ChunkRequest {
    ChunkRequest {
        upload_id: upload_id.into(),
        chunk_index: index,
        total_chunks: parts.len() as u32,
        chunk: parts[index as usize].clone(),
        filename: Some("cover.png".into()),
        mime_type: Some("image/png".into()),
        role: Some(role),
    }
}

#[tokio::test]
async fn chunked_upload_stores_image_once_complete() {
    let lib = TestLibrary::new().await;
    let data = b"PNG image bytes that span several chunks".to_vec();
    let parts = base64_parts(&data, 3);

    let first = lib
        .uploads
        .submit_chunk(chunk("up-1", 2, &parts, UploadRole::AlbumArt), "alice")
        .await
        .unwrap();
    assert!(!first.done);
    assert_eq!((first.received, first.total, first.progress_percent), (1, 3, 33));

    let second = lib
        .uploads
        .submit_chunk(chunk("up-1", 0, &parts, UploadRole::AlbumArt), "alice")
        .await
        .unwrap();
    assert_eq!(second.progress_percent, 66);
    assert!(second.url.is_none());

    let last = lib
        .uploads
        .submit_chunk(chunk("up-1", 1, &parts, UploadRole::AlbumArt), "alice")
        .await
        .unwrap();
    assert!(last.done);
    assert_eq!(last.progress_percent, 100);
    let key = last.key.expect("completed upload has a key");
    assert!(key.starts_with("album_art/"));
    assert!(key.ends_with(".png"));
    assert!(last.url.expect("completed upload has a url").contains("signature="));

    let stored = std::fs::read(lib.local.base_path().join(&key)).unwrap();
    assert_eq!(stored, data);
    assert!(lib.registry.is_empty());
}

#[tokio::test]
async fn same_bytes_in_different_roles_get_different_keys() {
    let lib = TestLibrary::new().await;
    let parts = base64_parts(b"face", 1);

    let avatar = lib
        .uploads
        .submit_chunk(chunk("a", 0, &parts, UploadRole::Avatar), "alice")
        .await
        .unwrap();
    let artist = lib
        .uploads
        .submit_chunk(chunk("b", 0, &parts, UploadRole::ArtistImage), "alice")
        .await
        .unwrap();

    let avatar_key = avatar.key.unwrap();
    let artist_key = artist.key.unwrap();
    assert!(avatar_key.starts_with("profiles/"));
    assert!(artist_key.starts_with("artist_images/"));
    assert_eq!(
        avatar_key.trim_start_matches("profiles/"),
        artist_key.trim_start_matches("artist_images/")
    );
}

#[tokio::test]
async fn chunks_from_another_user_are_rejected() {
    let lib = TestLibrary::new().await;
    let parts = base64_parts(b"private image", 2);
    lib.uploads
        .submit_chunk(chunk("up-2", 0, &parts, UploadRole::AlbumArt), "alice")
        .await
        .unwrap();

    let err = lib
        .uploads
        .submit_chunk(chunk("up-2", 1, &parts, UploadRole::AlbumArt), "mallory")
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::InvalidSession(_)));
    assert_eq!(lib.registry.progress("up-2"), Some((1, 2)));
}

#[tokio::test]
async fn cancel_discards_session_and_is_not_repeatable() {
    let lib = TestLibrary::new().await;
    let parts = base64_parts(b"abandoned image", 2);
    lib.uploads
        .submit_chunk(chunk("up-3", 0, &parts, UploadRole::SongArt), "alice")
        .await
        .unwrap();

    lib.uploads.cancel_chunked("up-3", "alice").unwrap();
    assert!(lib.registry.is_empty());
    assert!(matches!(
        lib.uploads.cancel_chunked("up-3", "alice"),
        Err(LibraryError::InvalidSession(_))
    ));
}

#[tokio::test]
async fn registry_capacity_is_enforced() {
    let lib = TestLibrary::with_limits(SessionLimits {
        max_sessions: 2,
        ..SessionLimits::default()
    })
    .await;
    let parts = base64_parts(b"some image", 2);

    for id in ["s1", "s2", "s3"] {
        lib.clock.advance(chrono::Duration::seconds(1));
        lib.uploads
            .submit_chunk(chunk(id, 0, &parts, UploadRole::AlbumArt), "alice")
            .await
            .unwrap();
    }
    assert_eq!(lib.registry.len(), 2);
    assert!(lib.registry.progress("s1").is_none());
}

#[tokio::test]
async fn song_upload_creates_catalog_rows() {
    let lib = TestLibrary::new().await;
    let mut meta = metadata("Z", &["X", "Y"], Some("Album Y"));
    meta.artwork = Some(artwork("z"));
    meta.duration = Some(215);

    let song_id = lib
        .uploads
        .process_file(song("z.mp3", audio("z"), meta), "alice")
        .await
        .unwrap();

    assert_eq!(lib.count("songs").await, 1);
    assert_eq!(lib.count("artists").await, 2);
    assert_eq!(lib.count("albums").await, 1);
    assert_eq!(lib.count("song_artists").await, 2);

    let (file_path, cover_art) = lib.song_locators(song_id).await;
    assert!(file_path.contains("/media/songs/"));
    assert!(file_path.ends_with(".mp3"));
    assert!(lib.path_of(&file_path).exists());
    let cover_art = cover_art.expect("artwork stored");
    assert!(cover_art.contains("/media/song_art/"));

    let album_id = lib.album_id_of(song_id).await;
    assert_eq!(lib.album_cover(album_id).await, Some(cover_art));
}

#[tokio::test]
async fn album_cover_is_only_backfilled_once() {
    let lib = TestLibrary::new().await;
    let mut first = metadata("One", &["X"], Some("Y"));
    first.artwork = Some(artwork("first"));
    let mut second = metadata("Two", &["X"], Some("Y"));
    second.artwork = Some(artwork("second"));

    let first_id = lib
        .uploads
        .process_file(song("1.mp3", audio("1"), first), "alice")
        .await
        .unwrap();
    let second_id = lib
        .uploads
        .process_file(song("2.mp3", audio("2"), second), "alice")
        .await
        .unwrap();

    let album_id = lib.album_id_of(first_id).await;
    assert_eq!(album_id, lib.album_id_of(second_id).await);
    let (_, first_cover) = lib.song_locators(first_id).await;
    assert_eq!(lib.album_cover(album_id).await, first_cover);
}

#[tokio::test]
async fn albums_are_scoped_to_the_uploader() {
    let lib = TestLibrary::new().await;
    lib.uploads
        .process_file(song("a.mp3", audio("a"), metadata("A", &["X"], Some("Y"))), "alice")
        .await
        .unwrap();
    lib.uploads
        .process_file(song("b.mp3", audio("b"), metadata("B", &["X"], Some("Y"))), "bob")
        .await
        .unwrap();

    assert_eq!(lib.count("artists").await, 2);
    assert_eq!(lib.count("albums").await, 2);
}

#[tokio::test]
async fn missing_artists_default_to_unknown_artist() {
    let lib = TestLibrary::new().await;
    lib.uploads
        .process_file(song("untagged.mp3", audio("u"), Default::default()), "alice")
        .await
        .unwrap();
    assert!(lib.artist_id("Unknown Artist").await > 0);
    assert_eq!(lib.count("albums").await, 0);
}

#[tokio::test]
async fn duplicate_song_is_rejected_before_storage() {
    let lib = TestLibrary::new().await;
    let first = lib
        .uploads
        .process_file(song("a.mp3", audio("same"), metadata("A", &["X"], None)), "alice")
        .await
        .unwrap();

    // A write would fail now; the duplicate check must answer first.
    lib.store.fail_puts(true);
    let err = lib
        .uploads
        .process_file(song("copy.mp3", audio("same"), metadata("B", &["X"], None)), "bob")
        .await
        .unwrap_err();
    match err {
        LibraryError::DuplicateFile { existing_song_id } => assert_eq!(existing_song_id, first),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(lib.count("songs").await, 1);
}

#[tokio::test]
async fn storage_failure_leaves_catalog_untouched() {
    let lib = TestLibrary::new().await;
    lib.store.fail_puts(true);
    let err = lib
        .uploads
        .process_file(song("a.mp3", audio("a"), metadata("A", &["X"], Some("Y"))), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Storage(_)));
    assert_eq!(lib.count("songs").await, 0);
    assert_eq!(lib.count("artists").await, 0);
}

#[tokio::test]
async fn batch_reports_partial_success() {
    let lib = TestLibrary::new().await;
    let upload_id = lib.uploads.begin_batch("alice", 3, 1024).unwrap();
    assert_eq!(lib.uploads.batch_status(&upload_id).unwrap().total_files, 3);

    let files = vec![
        song("a.mp3", audio("a"), metadata("A", &["X"], Some("Y"))),
        song("dup.mp3", audio("a"), metadata("A again", &["X"], Some("Y"))),
        song("c.mp3", audio("c"), metadata("C", &["X"], Some("Y"))),
    ];
    let report = lib
        .uploads
        .process_batch(files, "alice", Some(&upload_id))
        .await;

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.successful, 2);
    assert_eq!(report.summary.failed, 1);
    assert!(report.results[0].success);
    assert!(!report.results[1].success);
    assert!(
        report.results[1]
            .error
            .as_deref()
            .unwrap()
            .contains("duplicate")
    );
    assert!(report.results[2].success);
    assert_eq!(lib.count("songs").await, 2);
    assert!(lib.uploads.batch_status(&upload_id).is_none());
}

#[tokio::test]
async fn replaying_the_last_chunk_does_not_store_twice() {
    let lib = TestLibrary::new().await;
    let parts = base64_parts(b"one-shot cover", 2);
    lib.uploads
        .submit_chunk(chunk("up-4", 0, &parts, UploadRole::AlbumArt), "alice")
        .await
        .unwrap();
    let done = lib
        .uploads
        .submit_chunk(chunk("up-4", 1, &parts, UploadRole::AlbumArt), "alice")
        .await
        .unwrap();
    assert!(done.done);

    let err = lib
        .uploads
        .submit_chunk(chunk("up-4", 1, &parts, UploadRole::AlbumArt), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::InvalidSession(_)));
    assert!(lib.registry.is_empty());
}

#[tokio::test]
async fn chunks_for_an_expired_session_are_rejected() {
    let lib = TestLibrary::new().await;
    let parts = base64_parts(b"slow client image", 3);
    lib.uploads
        .submit_chunk(chunk("up-5", 0, &parts, UploadRole::AlbumArt), "alice")
        .await
        .unwrap();
    lib.clock.advance(chrono::Duration::hours(1));
    assert_eq!(lib.registry.sweep_expired(), 1);

    let err = lib
        .uploads
        .submit_chunk(chunk("up-5", 1, &parts, UploadRole::AlbumArt), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::InvalidSession(_)));
    assert!(lib.registry.is_empty());
}

#[tokio::test]
async fn concurrent_uploads_share_a_new_artist_and_album() {
    let lib = TestLibrary::new().await;
    let first = song("a.mp3", audio("a"), metadata("A", &["New"], Some("Debut")));
    let second = song("b.mp3", audio("b"), metadata("B", &["New"], Some("Debut")));
    let (first, second) = tokio::join!(
        lib.uploads.process_file(first, "alice"),
        lib.uploads.process_file(second, "alice"),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first, second);
    assert_eq!(lib.count("artists").await, 1);
    assert_eq!(lib.count("albums").await, 1);
    assert_eq!(lib.album_id_of(first).await, lib.album_id_of(second).await);
}

#[tokio::test]
async fn batch_leaves_another_users_tracker_alone() {
    let lib = TestLibrary::new().await;
    let upload_id = lib.uploads.begin_batch("alice", 1, 10).unwrap();

    let report = lib
        .uploads
        .process_batch(
            vec![song("m.mp3", audio("m"), metadata("M", &["X"], None))],
            "mallory",
            Some(&upload_id),
        )
        .await;

    assert_eq!(report.summary.successful, 1);
    let tracker = lib.uploads.batch_status(&upload_id).expect("tracker kept");
    assert_eq!(tracker.processed_files, 0);
    assert!(tracker.current_file.is_none());
}

#[tokio::test]
async fn abandoned_batch_trackers_are_swept() {
    let lib = TestLibrary::new().await;
    let upload_id = lib.uploads.begin_batch("alice", 2, 2048).unwrap();
    lib.clock.advance(chrono::Duration::days(30));

    assert_eq!(lib.batches.sweep(), 1);
    assert!(lib.uploads.batch_status(&upload_id).is_none());
}
