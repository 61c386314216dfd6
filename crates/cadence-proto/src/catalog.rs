use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// One playable song as served by the catalog API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "_id", default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub desc: String,
    /// Artwork URL.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub image: String,
    /// Media file URL handed to the audio output.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub file: String,
    /// Album association (the API stores the album name here).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub album: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    #[serde(rename = "_id", default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub image: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub desc: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Songs keep server order (previous/next walk it); albums are unordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub songs: Vec<Track>,
    pub albums: Vec<Album>,
}

impl Catalog {
    pub fn find(&self, id: &str) -> Option<&Track> {
        self.songs.iter().find(|t| t.id == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.songs.iter().position(|t| t.id == id)
    }

    pub fn album_for(&self, track: &Track) -> Option<&Album> {
        if track.album.is_empty() {
            return None;
        }
        self.albums
            .iter()
            .find(|a| a.name == track.album || a.id == track.album)
    }
}

// ── response parsing ──────────────────────────────────────────────────────────

/// Only the envelope can fail a response; unusable entries are skipped.
#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("response is missing `success: true`")]
    NotSuccessful,
    #[error("field `{0}` is missing or not an array")]
    NotAnArray(&'static str),
}

trait Entry: for<'de> Deserialize<'de> {
    fn usable(&self) -> bool;
}

impl Entry for Track {
    fn usable(&self) -> bool {
        !self.id.is_empty() && !self.file.is_empty()
    }
}

impl Entry for Album {
    fn usable(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Parse a `{ success: true, songs: [...] }` body.  Songs without an id or
/// a media file are dropped.
pub fn parse_songs(body: &Value) -> Result<Vec<Track>, FormatError> {
    parse_list(body, "songs")
}

/// Parse a `{ success: true, albums: [...] }` body.  Albums without an id
/// are dropped.
pub fn parse_albums(body: &Value) -> Result<Vec<Album>, FormatError> {
    parse_list(body, "albums")
}

fn parse_list<T: Entry>(body: &Value, field: &'static str) -> Result<Vec<T>, FormatError> {
    if body.get("success").and_then(Value::as_bool) != Some(true) {
        return Err(FormatError::NotSuccessful);
    }
    let items = body
        .get(field)
        .and_then(Value::as_array)
        .ok_or(FormatError::NotAnArray(field))?;
    Ok(items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| match T::deserialize(item) {
            Ok(entry) if entry.usable() => Some(entry),
            Ok(_) => {
                warn!("catalog: skipping {}[{}]: no usable id or file", field, idx);
                None
            }
            Err(e) => {
                warn!("catalog: skipping {}[{}]: {}", field, idx, e);
                None
            }
        })
        .collect())
}

/// Human-readable `message` from a failure body, if the server sent one.
pub fn server_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn song(id: &str, album: &str) -> Value {
        json!({
            "_id": id,
            "name": format!("Song {id}"),
            "desc": "",
            "image": "https://cdn.example/a.png",
            "file": format!("https://cdn.example/{id}.mp3"),
            "album": album,
        })
    }

    #[test]
    fn test_parse_songs_keeps_server_order() {
        let body = json!({ "success": true, "songs": [song("b", ""), song("a", "")] });
        let songs = parse_songs(&body).unwrap();
        let ids: Vec<&str> = songs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn test_parse_songs_rejects_non_array() {
        let body = json!({ "success": true, "songs": "not-an-array" });
        assert_eq!(parse_songs(&body), Err(FormatError::NotAnArray("songs")));
    }

    #[test]
    fn test_parse_requires_success_flag() {
        let body = json!({ "songs": [] });
        assert_eq!(parse_songs(&body), Err(FormatError::NotSuccessful));
        let body = json!({ "success": false, "albums": [] });
        assert_eq!(parse_albums(&body), Err(FormatError::NotSuccessful));
    }

    #[test]
    fn test_parse_songs_skips_unusable_entries() {
        let body = json!({
            "success": true,
            "songs": [
                song("a", ""),
                { "name": "no id", "file": "https://cdn.example/x.mp3" },
                { "_id": "nofile", "name": "No file" },
                { "_id": 42, "name": "numeric id", "file": "https://cdn.example/n.mp3" },
                "not an object",
                song("b", ""),
            ]
        });
        let songs = parse_songs(&body).unwrap();
        let ids: Vec<&str> = songs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_null_optional_fields_read_as_empty() {
        let body = json!({
            "success": true,
            "songs": [{
                "_id": "b",
                "name": "B",
                "file": "https://cdn.example/b.mp3",
                "desc": null,
                "image": null,
                "album": null
            }],
            "albums": [{ "_id": "x1", "name": null, "desc": null }]
        });
        let songs = parse_songs(&body).unwrap();
        assert_eq!(songs.len(), 1);
        assert!(songs[0].desc.is_empty());
        assert!(songs[0].album.is_empty());
        let albums = parse_albums(&body).unwrap();
        assert_eq!(albums[0].id, "x1");
        assert!(albums[0].name.is_empty());
    }

    #[test]
    fn test_optional_fields_default() {
        let body = json!({
            "success": true,
            "albums": [{ "_id": "x1", "name": "Night Drive", "extra": 3 }]
        });
        let albums = parse_albums(&body).unwrap();
        assert_eq!(albums[0].name, "Night Drive");
        assert!(albums[0].desc.is_empty());
    }

    #[test]
    fn test_album_for_matches_name_or_id() {
        let catalog = Catalog {
            songs: vec![],
            albums: vec![Album {
                id: "al-1".into(),
                name: "Night Drive".into(),
                image: String::new(),
                desc: String::new(),
            }],
        };
        let by_name: Track = serde_json::from_value(song("s1", "Night Drive")).unwrap();
        let by_id: Track = serde_json::from_value(song("s2", "al-1")).unwrap();
        let orphan: Track = serde_json::from_value(song("s3", "")).unwrap();
        assert_eq!(catalog.album_for(&by_name).unwrap().id, "al-1");
        assert_eq!(catalog.album_for(&by_id).unwrap().id, "al-1");
        assert!(catalog.album_for(&orphan).is_none());
    }

    #[test]
    fn test_server_message() {
        assert_eq!(
            server_message(&json!({ "success": false, "message": "Database offline" })),
            Some("Database offline".to_string())
        );
        assert_eq!(server_message(&json!({ "message": "  " })), None);
        assert_eq!(server_message(&json!({ "success": false })), None);
    }
}
