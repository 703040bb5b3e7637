//! A fully wired library over a temp directory and a temp SQLite file.

use super::storage::FlakyStore;
use media_library::{
    db,
    routes::routes::routes,
    services::{
        batch_tracker::BatchTracker,
        clock::ManualClock,
        content_store::StorageProvider,
        deletion_service::DeletionService,
        local_storage::LocalStorage,
        upload_registry::{SessionLimits, UploadSessionRegistry},
        upload_service::UploadService,
        url_cache::UrlSigningCache,
    },
    state::AppState,
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tempfile::TempDir;

pub const PUBLIC_BASE_URL: &str = "http://media.test";
pub const URL_TTL: Duration = Duration::from_secs(3600);

/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestLibrary {
    pub db: Arc<SqlitePool>,
    pub local: Arc<LocalStorage>,
    pub store: Arc<FlakyStore>,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<UploadSessionRegistry>,
    pub urls: Arc<UrlSigningCache>,
    pub batches: Arc<BatchTracker>,
    pub uploads: UploadService,
    pub deletions: DeletionService,
    pub state: AppState,
    pub router: axum::Router,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestLibrary {
    pub async fn new() -> Self {
        Self::with_limits(SessionLimits::default()).await
    }

    pub async fn with_limits(limits: SessionLimits) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let db_url = format!("sqlite://{}", temp_dir.path().join("library.db").display());
        let db = Arc::new(db::connect(&db_url, 4).await.expect("Failed to open database"));
        db::run_migrations(&db).await.expect("Failed to run migrations");

        let local = Arc::new(LocalStorage::new(
            temp_dir.path().join("media"),
            PUBLIC_BASE_URL,
            b"test-signing-secret",
        ));
        let store = Arc::new(FlakyStore::new(local.clone()));
        let provider: Arc<dyn StorageProvider> = store.clone();

        let clock = Arc::new(ManualClock::default());
        let registry = Arc::new(UploadSessionRegistry::new(limits, clock.clone()));
        let urls = Arc::new(UrlSigningCache::new(
            provider.clone(),
            Duration::from_secs(600),
            clock.clone(),
        ));
        let batches = Arc::new(BatchTracker::new(
            Duration::from_secs(30 * 60),
            clock.clone(),
        ));
        let uploads = UploadService::new(
            db.clone(),
            provider.clone(),
            registry.clone(),
            urls.clone(),
            batches.clone(),
            URL_TTL,
        );
        let deletions = DeletionService::new(db.clone(), provider.clone());

        let state = AppState {
            db: db.clone(),
            store: provider,
            local: Some(local.clone()),
            uploads: uploads.clone(),
            deletions: deletions.clone(),
            urls: urls.clone(),
            default_url_ttl: URL_TTL,
        };
        let router = routes(16 * 1024 * 1024).with_state(state.clone());

        Self {
            db,
            local,
            store,
            clock,
            registry,
            urls,
            batches,
            uploads,
            deletions,
            state,
            router,
            _temp_dir: temp_dir,
        }
    }

    /// Path on disk of a stored locator.
    pub fn path_of(&self, locator: &str) -> PathBuf {
        let key = locator
            .strip_prefix(&format!("{}/media/", PUBLIC_BASE_URL))
            .expect("locator not from the local store");
        self.local.base_path().join(key)
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&*self.db)
            .await
            .expect("count query failed")
    }

    pub async fn song_locators(&self, song_id: i64) -> (String, Option<String>) {
        sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT file_path, cover_art FROM songs WHERE id = ?",
        )
        .bind(song_id)
        .fetch_one(&*self.db)
        .await
        .expect("song not found")
    }

    pub async fn album_id_of(&self, song_id: i64) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT album_id FROM songs WHERE id = ?")
            .bind(song_id)
            .fetch_one(&*self.db)
            .await
            .expect("song has no album")
    }

    pub async fn album_cover(&self, album_id: i64) -> Option<String> {
        sqlx::query_scalar::<_, Option<String>>("SELECT cover_art FROM albums WHERE id = ?")
            .bind(album_id)
            .fetch_one(&*self.db)
            .await
            .expect("album not found")
    }

    pub async fn artist_id(&self, name: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT id FROM artists WHERE name = ?")
            .bind(name)
            .fetch_one(&*self.db)
            .await
            .expect("artist not found")
    }

    /// Add a listen and a playlist entry for `song_id`.
    pub async fn add_activity(&self, song_id: i64, user_id: &str) {
        sqlx::query("INSERT INTO song_listens (song_id, user_id, listened_at) VALUES (?, ?, ?)")
            .bind(song_id)
            .bind(user_id)
            .bind(chrono::Utc::now())
            .execute(&*self.db)
            .await
            .expect("insert listen");
        let playlist_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO playlists (name, owner_id, created_at) VALUES ('mix', ?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(chrono::Utc::now())
        .fetch_one(&*self.db)
        .await
        .expect("insert playlist");
        sqlx::query("INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES (?, ?, 0)")
            .bind(playlist_id)
            .bind(song_id)
            .execute(&*self.db)
            .await
            .expect("insert playlist entry");
    }

    /// Make every delete on `songs` abort.
    pub async fn block_song_deletes(&self) {
        sqlx::query(
            "CREATE TRIGGER block_song_delete BEFORE DELETE ON songs
             BEGIN SELECT RAISE(ABORT, 'song deletes blocked'); END",
        )
        .execute(&*self.db)
        .await
        .expect("create trigger");
    }
}
