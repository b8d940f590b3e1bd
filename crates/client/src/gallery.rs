//! Persisted image gallery: one large view plus a bounded thumbnail grid.
//!
//! Images are opaque data-URL strings; encoding is outside this crate.
//! GM-managed in the UI, but the data layer doesn't enforce roles.

use serde::{Deserialize, Serialize};

use crate::store::{self, keys, KeyValueStore};

/// Maximum number of thumbnails kept.
pub const THUMB_CAPACITY: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gallery {
    pub large: Option<String>,
    pub thumbs: Vec<String>,
}

impl Gallery {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        Self {
            large: store.get(keys::GALLERY_LARGE),
            thumbs: store::get_json(store, keys::GALLERY_THUMBS).unwrap_or_default(),
        }
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) {
        match &self.large {
            Some(large) => store.set(keys::GALLERY_LARGE, large),
            None => store.remove(keys::GALLERY_LARGE),
        }
        store::set_json(store, keys::GALLERY_THUMBS, &self.thumbs);
    }

    /// Add thumbnails up to capacity; the first image ever added also
    /// becomes the large view.
    pub fn add_images(&mut self, images: impl IntoIterator<Item = String>) {
        self.thumbs.extend(images);
        self.thumbs.truncate(THUMB_CAPACITY);
        if self.large.is_none() {
            self.large = self.thumbs.first().cloned();
        }
    }

    pub fn remove_thumb(&mut self, index: usize) {
        if index < self.thumbs.len() {
            self.thumbs.remove(index);
        }
    }

    pub fn set_large(&mut self, image: String) {
        self.large = Some(image);
    }
}
