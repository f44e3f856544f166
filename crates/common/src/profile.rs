//! Profile records and the fixed six-slot photo gallery.

use crate::error::CommonError;
use crate::types::SubjectId;
use serde::{Deserialize, Serialize};

/// Number of photo slots in every gallery.
pub const PHOTO_SLOTS: usize = 6;

/// Checked index into a [`PhotoGallery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhotoSlot(usize);

impl PhotoSlot {
    /// Create a slot from a zero-based index.
    ///
    /// # Errors
    ///
    /// Returns `CommonError::InvalidPhotoSlot` if `index >= PHOTO_SLOTS`.
    pub fn new(index: usize) -> Result<Self, CommonError> {
        if index < PHOTO_SLOTS {
            Ok(Self(index))
        } else {
            Err(CommonError::InvalidPhotoSlot(index))
        }
    }

    /// Zero-based index of this slot.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    /// All slots in display order.
    pub fn all() -> impl Iterator<Item = PhotoSlot> {
        (0..PHOTO_SLOTS).map(PhotoSlot)
    }
}

/// Ordered gallery of photo references, each slot independently empty.
///
/// References are media-CDN public ids or storage paths; this type does
/// not interpret them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoGallery([Option<String>; PHOTO_SLOTS]);

impl PhotoGallery {
    /// Build a gallery from its slots in order.
    #[must_use]
    pub fn from_slots(slots: [Option<String>; PHOTO_SLOTS]) -> Self {
        Self(slots)
    }

    /// Consume the gallery, returning its slots in order.
    #[must_use]
    pub fn into_slots(self) -> [Option<String>; PHOTO_SLOTS] {
        self.0
    }

    /// Photo reference stored in `slot`, if any.
    #[must_use]
    pub fn get(&self, slot: PhotoSlot) -> Option<&str> {
        self.0.get(slot.index()).and_then(Option::as_deref)
    }

    /// Store `reference` in `slot`, replacing whatever was there.
    pub fn set(&mut self, slot: PhotoSlot, reference: impl Into<String>) {
        if let Some(entry) = self.0.get_mut(slot.index()) {
            *entry = Some(reference.into());
        }
    }

    /// Empty `slot`.
    pub fn clear(&mut self, slot: PhotoSlot) {
        if let Some(entry) = self.0.get_mut(slot.index()) {
            *entry = None;
        }
    }

    /// Number of slots holding a photo.
    #[must_use]
    pub fn filled(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    /// Slots with their contents, in order.
    pub fn iter(&self) -> impl Iterator<Item = (PhotoSlot, Option<&str>)> + '_ {
        PhotoSlot::all().zip(self.0.iter().map(Option::as_deref))
    }
}

/// Application-level user record keyed by the session subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: SubjectId,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    /// Avatar reference (storage path or media public id).
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub gallery: PhotoGallery,
}

impl Profile {
    /// An empty profile for `id`.
    #[must_use]
    pub fn new(id: SubjectId) -> Self {
        Self {
            id,
            username: None,
            full_name: None,
            bio: None,
            avatar_url: None,
            gallery: PhotoGallery::default(),
        }
    }

    /// Name shown to other users: full name, then username, then the raw id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                self.username
                    .as_deref()
                    .filter(|name| !name.trim().is_empty())
            })
            .unwrap_or_else(|| self.id.as_str())
    }
}

/// Partial profile write requested by application code.
///
/// `None` fields are left untouched. A present gallery replaces all six
/// slots, so an empty slot in it clears the stored photo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub gallery: Option<PhotoGallery>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }

    #[must_use]
    pub fn avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    #[must_use]
    pub fn gallery(mut self, gallery: PhotoGallery) -> Self {
        self.gallery = Some(gallery);
        self
    }

    /// Whether the update would write nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
            && self.gallery.is_none()
    }

    /// The profile that results from applying this update to `profile`.
    #[must_use]
    pub fn apply_to(&self, profile: &Profile) -> Profile {
        let mut updated = profile.clone();
        if let Some(username) = &self.username {
            updated.username = Some(username.clone());
        }
        if let Some(bio) = &self.bio {
            updated.bio = Some(bio.clone());
        }
        if let Some(avatar_url) = &self.avatar_url {
            updated.avatar_url = Some(avatar_url.clone());
        }
        if let Some(gallery) = &self.gallery {
            updated.gallery = gallery.clone();
        }
        updated
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn slot(index: usize) -> PhotoSlot {
        PhotoSlot::new(index).unwrap()
    }

    #[test]
    fn test_photo_slot_bounds() {
        assert!(PhotoSlot::new(0).is_ok());
        assert!(PhotoSlot::new(5).is_ok());
        assert_eq!(PhotoSlot::new(6), Err(CommonError::InvalidPhotoSlot(6)));
        assert_eq!(PhotoSlot::all().count(), PHOTO_SLOTS);
    }

    #[test]
    fn test_gallery_slots_are_independent() {
        let mut gallery = PhotoGallery::default();
        assert_eq!(gallery.filled(), 0);

        gallery.set(slot(0), "cld/first");
        gallery.set(slot(4), "cld/fifth");
        assert_eq!(gallery.get(slot(0)), Some("cld/first"));
        assert_eq!(gallery.get(slot(1)), None);
        assert_eq!(gallery.get(slot(4)), Some("cld/fifth"));
        assert_eq!(gallery.filled(), 2);

        gallery.clear(slot(0));
        assert_eq!(gallery.get(slot(0)), None);
        assert_eq!(gallery.filled(), 1);

        let contents: Vec<_> = gallery.iter().map(|(s, r)| (s.index(), r)).collect();
        assert_eq!(contents.len(), PHOTO_SLOTS);
        assert_eq!(contents.get(4), Some(&(4, Some("cld/fifth"))));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut profile = Profile::new(SubjectId::new("u1").unwrap());
        assert_eq!(profile.display_name(), "u1");

        profile.username = Some("skater".to_string());
        assert_eq!(profile.display_name(), "skater");

        profile.full_name = Some("   ".to_string());
        assert_eq!(profile.display_name(), "skater");

        profile.full_name = Some("Sam Park".to_string());
        assert_eq!(profile.display_name(), "Sam Park");
    }

    #[test]
    fn test_update_apply_leaves_absent_fields() {
        let mut profile = Profile::new(SubjectId::new("u1").unwrap());
        profile.bio = Some("old bio".to_string());
        profile.avatar_url = Some("avatars/old.png".to_string());
        profile.gallery.set(slot(2), "cld/keep");

        let updated = ProfileUpdate::new().username("new-name").apply_to(&profile);
        assert_eq!(updated.username.as_deref(), Some("new-name"));
        assert_eq!(updated.bio.as_deref(), Some("old bio"));
        assert_eq!(updated.avatar_url.as_deref(), Some("avatars/old.png"));
        assert_eq!(updated.gallery.get(slot(2)), Some("cld/keep"));
    }

    #[test]
    fn test_update_gallery_replaces_all_slots() {
        let mut profile = Profile::new(SubjectId::new("u1").unwrap());
        profile.gallery.set(slot(2), "cld/old");

        let mut gallery = PhotoGallery::default();
        gallery.set(slot(0), "cld/new");

        let updated = ProfileUpdate::new().gallery(gallery).apply_to(&profile);
        assert_eq!(updated.gallery.get(slot(0)), Some("cld/new"));
        assert_eq!(updated.gallery.get(slot(2)), None);
    }

    #[test]
    fn test_update_is_empty() {
        assert!(ProfileUpdate::new().is_empty());
        assert!(!ProfileUpdate::new().bio("hi").is_empty());
    }
}
