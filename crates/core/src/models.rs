use crate::chunking::ChunkingConfig;
use serde::{Deserialize, Serialize};
use serde_with::{formats::PreferMany, serde_as, DefaultOnNull, OneOrMany};
use sha2::{Digest, Sha256};

/// A source article as persisted by the scraper, one JSON object per line.
///
/// Both the raw layout (`title`, `url`, `content`) and the enriched layout
/// (`topic`, `raw_text`, `summary`, ...) decode into this type. Absent or
/// `null` fields fall back to empty values so a thin record still indexes.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default, alias = "topic")]
    #[serde_as(as = "DefaultOnNull")]
    pub title: String,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    pub url: String,
    #[serde(default, alias = "raw_text")]
    #[serde_as(as = "DefaultOnNull")]
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<OneOrMany<_, PreferMany>>")]
    pub key_points: Vec<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<OneOrMany<_, PreferMany>>")]
    pub locations: Vec<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<OneOrMany<_, PreferMany>>")]
    pub people: Vec<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Document {
    /// The url when present. Without one, the title plus a digest of the
    /// content, so url-less records with blank or repeated titles stay apart.
    pub fn identity(&self) -> String {
        let url = self.url.trim();
        if !url.is_empty() {
            return url.to_string();
        }

        let mut hasher = Sha256::new();
        hasher.update(self.content.trim().as_bytes());
        format!("{}#{:x}", self.title.trim(), hasher.finalize())
    }

    pub fn document_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.identity().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Stored unit of the search index: one chunk, its parent's metadata, and its vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedRecord {
    pub record_id: String,
    pub document_id: String,
    pub title: String,
    pub url: String,
    pub text: String,
    pub chunk_id: u32,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub locations: Vec<String>,
    pub people: Vec<String>,
    pub date: Option<String>,
    pub source: Option<String>,
    pub embedding: Vec<f32>,
}

impl IndexedRecord {
    pub fn from_chunk(document: &Document, chunk_id: u32, text: String, embedding: Vec<f32>) -> Self {
        Self {
            record_id: make_record_id(&document.identity(), chunk_id),
            document_id: document.document_id(),
            title: document.title.clone(),
            url: document.url.clone(),
            text,
            chunk_id,
            summary: document.summary.clone(),
            key_points: document.key_points.clone(),
            locations: document.locations.clone(),
            people: document.people.clone(),
            date: document.date.clone(),
            source: document.source.clone(),
            embedding,
        }
    }

    pub fn to_hit(&self, score: f64) -> RetrievalHit {
        RetrievalHit {
            score,
            record_id: self.record_id.clone(),
            document_id: self.document_id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            text: self.text.clone(),
            chunk_id: self.chunk_id,
            summary: self.summary.clone(),
            key_points: self.key_points.clone(),
            locations: self.locations.clone(),
            people: self.people.clone(),
            date: self.date.clone(),
            source: self.source.clone(),
        }
    }
}

/// Deterministic id for a chunk so re-indexing the same document overwrites its records.
pub fn make_record_id(identity: &str, chunk_id: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update(chunk_id.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalHit {
    pub score: f64,
    pub record_id: String,
    pub document_id: String,
    pub title: String,
    pub url: String,
    pub text: String,
    pub chunk_id: u32,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub locations: Vec<String>,
    pub people: Vec<String>,
    pub date: Option<String>,
    pub source: Option<String>,
}

/// Fields returned by a similarity search; everything except the vector.
pub const HIT_FIELDS: [&str; 12] = [
    "record_id",
    "document_id",
    "title",
    "url",
    "text",
    "chunk_id",
    "summary",
    "key_points",
    "locations",
    "people",
    "date",
    "source",
];

#[derive(Debug, Clone, Copy)]
pub struct IndexingOptions {
    pub chunking: ChunkingConfig,
    pub batch_size: usize,
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            batch_size: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_record_decodes() {
        let line = r#"{"title": "D-Day", "url": "https://en.wikipedia.org/wiki/Normandy_landings", "content": "The Normandy landings"}"#;
        let document: Document = serde_json::from_str(line).expect("raw record");
        assert_eq!(document.title, "D-Day");
        assert_eq!(document.content, "The Normandy landings");
        assert!(document.key_points.is_empty());
        assert_eq!(document.summary, None);
    }

    #[test]
    fn structured_record_decodes_with_aliases() {
        let line = r#"{
            "topic": "Battle of Midway",
            "summary": "Decisive naval battle.",
            "key_points": ["Four carriers sunk", "Turning point"],
            "locations": "Midway Atoll",
            "people": null,
            "date": "4-7 June 1942",
            "raw_text": "The Battle of Midway was a major naval battle",
            "source": "wikipedia",
            "url": "https://en.wikipedia.org/wiki/Battle_of_Midway"
        }"#;
        let document: Document = serde_json::from_str(line).expect("structured record");
        assert_eq!(document.title, "Battle of Midway");
        assert_eq!(document.content, "The Battle of Midway was a major naval battle");
        assert_eq!(document.key_points.len(), 2);
        assert_eq!(document.locations, vec!["Midway Atoll".to_string()]);
        assert!(document.people.is_empty());
        assert_eq!(document.source.as_deref(), Some("wikipedia"));
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let document: Document = serde_json::from_str(r#"{"title": null}"#).expect("sparse record");
        assert_eq!(document.title, "");
        assert_eq!(document.content, "");
    }

    #[test]
    fn identity_prefers_url() {
        let mut document = Document {
            title: "Holocaust".to_string(),
            content: "Genocide of European Jews".to_string(),
            ..Default::default()
        };
        assert!(document.identity().starts_with("Holocaust#"));
        document.url = "https://en.wikipedia.org/wiki/The_Holocaust".to_string();
        assert_eq!(document.identity(), "https://en.wikipedia.org/wiki/The_Holocaust");
    }

    #[test]
    fn url_less_records_are_told_apart_by_content() {
        let midway = Document {
            content: "The Battle of Midway was fought in June 1942.".to_string(),
            ..Default::default()
        };
        let barbarossa = Document {
            content: "Operation Barbarossa began on 22 June 1941.".to_string(),
            ..Default::default()
        };
        assert_ne!(midway.identity(), barbarossa.identity());
        assert_ne!(midway.document_id(), barbarossa.document_id());

        let same_title = Document {
            title: "Battle of Midway".to_string(),
            ..midway.clone()
        };
        let repeated_title = Document {
            title: "Battle of Midway".to_string(),
            ..barbarossa.clone()
        };
        assert_ne!(same_title.identity(), repeated_title.identity());
        assert_eq!(midway.identity(), midway.clone().identity());
    }

    #[test]
    fn record_ids_are_stable_per_chunk() {
        assert_eq!(make_record_id("http://x", 0), make_record_id("http://x", 0));
        assert_ne!(make_record_id("http://x", 0), make_record_id("http://x", 1));
        assert_ne!(make_record_id("http://x", 0), make_record_id("http://y", 0));
    }
}
