//! Test data helpers.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use media_library::{
    models::upload::{ArtworkPayload, SongMetadata},
    services::upload_service::IncomingSong,
};

/// Distinct fake audio bytes per seed.
#[allow(dead_code)]
pub fn audio(seed: &str) -> Bytes {
    Bytes::from(format!("ID3\u{4}fake-audio-{}", seed).into_bytes())
}

#[allow(dead_code)]
pub fn artwork(seed: &str) -> ArtworkPayload {
    ArtworkPayload {
        data: format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(format!("PNG-{}", seed))
        ),
        mime_type: Some("image/png".into()),
    }
}

#[allow(dead_code)]
pub fn metadata(title: &str, artists: &[&str], album: Option<&str>) -> SongMetadata {
    SongMetadata {
        title: Some(title.into()),
        artists: artists.iter().map(|a| a.to_string()).collect(),
        album: album.map(str::to_string),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn song(filename: &str, data: Bytes, metadata: SongMetadata) -> IncomingSong {
    IncomingSong {
        filename: filename.into(),
        content_type: Some("audio/mpeg".into()),
        data,
        metadata,
    }
}

/// Base64 of `data`, cut into `parts` pieces of roughly equal length.
#[allow(dead_code)]
pub fn base64_parts(data: &[u8], parts: usize) -> Vec<String> {
    let encoded = general_purpose::STANDARD.encode(data);
    let size = encoded.len().div_ceil(parts);
    encoded
        .as_bytes()
        .chunks(size)
        .map(|c| String::from_utf8(c.to_vec()).unwrap())
        .collect()
}
