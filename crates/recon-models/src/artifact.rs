//! Captured image artifacts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Downscaled JPEG for the review screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewHandle {
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub jpeg: Vec<u8>,
}

impl PreviewHandle {
    pub fn new(width: u32, height: u32, jpeg: Vec<u8>) -> Self {
        Self { width, height, jpeg }
    }

    /// `data:` URL suitable for an `<img src>`.
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(&self.jpeg))
    }
}

/// A freshly captured frame waiting for keep/retake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingArtifact {
    pub id: Uuid,
    pub step_name: String,
    /// Full-resolution JPEG.
    pub image_bytes: Vec<u8>,
    pub preview: PreviewHandle,
    pub captured_at: DateTime<Utc>,
}

impl PendingArtifact {
    /// Confirm the artifact, handing ownership to the caller.
    pub fn confirm(self) -> CapturedPhoto {
        CapturedPhoto {
            id: self.id,
            step_name: self.step_name,
            image_bytes: self.image_bytes,
            preview: self.preview,
            captured_at: self.captured_at,
        }
    }
}

/// A kept photo, delivered to the caller for the step it was taken on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPhoto {
    pub id: Uuid,
    pub step_name: String,
    #[serde(skip)]
    pub image_bytes: Vec<u8>,
    pub preview: PreviewHandle,
    pub captured_at: DateTime<Utc>,
}

impl CapturedPhoto {
    /// File name used when persisting, e.g. `left-front-wheel-<id>.jpg`.
    pub fn file_name(&self) -> String {
        let slug: String = self
            .step_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let slug = slug
            .split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        format!("{}-{}.jpg", slug, self.id.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(step: &str) -> PendingArtifact {
        PendingArtifact {
            id: Uuid::new_v4(),
            step_name: step.to_string(),
            image_bytes: vec![0xFF, 0xD8, 0xFF],
            preview: PreviewHandle::new(4, 3, vec![0xFF, 0xD8]),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_data_url_prefix() {
        let preview = PreviewHandle::new(4, 3, vec![0xFF, 0xD8]);
        assert_eq!(preview.to_data_url(), "data:image/jpeg;base64,/9g=");
    }

    #[test]
    fn test_confirm_keeps_identity() {
        let artifact = pending("Left Front Tire");
        let id = artifact.id;
        let photo = artifact.confirm();
        assert_eq!(photo.id, id);
        assert_eq!(photo.step_name, "Left Front Tire");
        assert_eq!(photo.image_bytes.len(), 3);
    }

    #[test]
    fn test_file_name_slug() {
        let photo = pending("Windshield / Dash").confirm();
        let name = photo.file_name();
        assert!(name.starts_with("windshield-dash-"), "{name}");
        assert!(name.ends_with(".jpg"));
    }
}
