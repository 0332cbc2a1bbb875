//! Collection domain record, draft, image payload, and patch types.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::CollectionId;

/// Opaque encoded image payload (e.g. JPEG bytes).
///
/// Serialized as a base64 string so JSON snapshots stay compact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct ImageBlob {
    /// Raw encoded image bytes.
    pub bytes: Vec<u8>,
}

impl ImageBlob {
    /// Wraps encoded image bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the payload holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for ImageBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl Serialize for ImageBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.bytes))
    }
}

impl<'de> Deserialize<'de> for ImageBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Self::from)
            .map_err(serde::de::Error::custom)
    }
}

/// Fully materialized, persisted collection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    /// Stable collection identifier.
    pub id: CollectionId,
    /// Display name. Duplicates are allowed.
    pub name: String,
    /// Free-text note.
    pub note: String,
    /// Encoded images in display order.
    pub images: Vec<ImageBlob>,
    /// Favorite flag.
    pub is_favorite: bool,
}

/// Insert payload used to create a new [`CollectionRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionDraft {
    /// Display name.
    pub name: String,
    /// Free-text note.
    pub note: String,
    /// Encoded images in display order.
    pub images: Vec<ImageBlob>,
}

impl CollectionDraft {
    /// Draft with a name and no note or images.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Sparse patch where each `Some` field overwrites the record value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionPatch {
    /// Optional replacement for the name.
    pub name: Option<String>,
    /// Optional replacement for the note.
    pub note: Option<String>,
    /// Optional replacement for the whole image sequence.
    pub images: Option<Vec<ImageBlob>>,
}

impl CollectionPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(self, rec: &mut CollectionRecord) {
        if let Some(v) = self.name {
            rec.name = v;
        }
        if let Some(v) = self.note {
            rec.note = v;
        }
        if let Some(v) = self.images {
            rec.images = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_blob_serializes_as_base64() {
        let blob = ImageBlob::new(vec![0xff, 0xd8, 0xff, 0xe0]);
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, "\"/9j/4A==\"");
        let back: ImageBlob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blob);
    }

    #[test]
    fn image_blob_rejects_invalid_base64() {
        assert!(serde_json::from_str::<ImageBlob>("\"not base64!\"").is_err());
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut rec = CollectionRecord {
            id: 7,
            name: "Beach".to_string(),
            note: "sand".to_string(),
            images: vec![ImageBlob::new(vec![1])],
            is_favorite: true,
        };
        CollectionPatch {
            note: Some("sea".to_string()),
            ..CollectionPatch::default()
        }
        .apply_to(&mut rec);

        assert_eq!(rec.name, "Beach");
        assert_eq!(rec.note, "sea");
        assert_eq!(rec.images, vec![ImageBlob::new(vec![1])]);
        assert!(rec.is_favorite);
    }
}
