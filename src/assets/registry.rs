//! Deduplicating asset maps for one conversion run.

use std::collections::HashMap;

use crate::naming::ensure_forward_slashes;

/// Fetch state of a registered asset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssetSlot {
    #[default]
    Pending,
    Fetched(Vec<u8>),
    Failed,
}

/// One registered asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Virtual path inside the package.
    pub path: String,
    /// Source URL the asset was first registered with.
    pub url: String,
    pub slot: AssetSlot,
}

impl AssetEntry {
    /// Fetched bytes, if any.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match &self.slot {
            AssetSlot::Fetched(data) => Some(data),
            AssetSlot::Pending | AssetSlot::Failed => None,
        }
    }
}

/// Insertion-ordered map from virtual path to asset. First registration wins.
#[derive(Debug, Clone, Default)]
pub struct AssetMap {
    entries: Vec<AssetEntry>,
    index: HashMap<String, usize>,
}

impl AssetMap {
    /// Registers `url` under `path`; returns false if the path was taken.
    pub fn insert(&mut self, path: &str, url: &str) -> bool {
        if self.index.contains_key(path) {
            return false;
        }
        self.index.insert(path.to_string(), self.entries.len());
        self.entries.push(AssetEntry {
            path: path.to_string(),
            url: url.to_string(),
            slot: AssetSlot::Pending,
        });
        true
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&AssetEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &AssetEntry> {
        self.entries.iter()
    }

    /// Entries whose bytes were fetched, in registration order.
    pub fn fetched(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .filter_map(|entry| entry.data().map(|data| (entry.path.as_str(), data)))
    }

    /// `(path, url)` pairs still waiting to be fetched.
    #[must_use]
    pub fn pending(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|entry| entry.slot == AssetSlot::Pending)
            .map(|entry| (entry.path.clone(), entry.url.clone()))
            .collect()
    }

    /// Updates the slot of `path`; unknown paths are ignored.
    pub fn set_slot(&mut self, path: &str, slot: AssetSlot) {
        if let Some(&i) = self.index.get(path) {
            self.entries[i].slot = slot;
        }
    }
}

/// A registered stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssSource {
    pub url: String,
    /// Generated package filename, `StyleNN.css`.
    pub filename: String,
    /// Fetched text with hidden rules neutralized.
    pub content: Option<String>,
}

/// All assets discovered while converting one book.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    css: Vec<CssSource>,
    css_index: HashMap<String, usize>,
    fonts: AssetMap,
    images: AssetMap,
    css_assets: AssetMap,
}

impl AssetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stylesheet URL and returns its `StyleNN.css` filename.
    pub fn register_css(&mut self, url: &str) -> String {
        let key = ensure_forward_slashes(url);
        if let Some(&i) = self.css_index.get(&key) {
            return self.css[i].filename.clone();
        }
        let filename = format!("Style{:02}.css", self.css.len());
        self.css_index.insert(key.clone(), self.css.len());
        self.css.push(CssSource {
            url: key,
            filename: filename.clone(),
            content: None,
        });
        filename
    }

    /// Registered stylesheets in first-seen order.
    #[must_use]
    pub fn css_sources(&self) -> &[CssSource] {
        &self.css
    }

    /// Stores fetched text for the stylesheet at `position`.
    pub fn set_css_content(&mut self, position: usize, content: String) {
        if let Some(source) = self.css.get_mut(position) {
            source.content = Some(content);
        }
    }

    /// Registers a page image under `Images/{relative}` and returns that path.
    pub fn register_image(&mut self, relative: &str, url: &str) -> String {
        self.images.insert(relative, url);
        format!("Images/{relative}")
    }

    /// Registers a font under its `Styles/`-rooted path.
    pub fn register_font(&mut self, path: &str, url: &str) -> bool {
        self.fonts.insert(path, url)
    }

    /// Registers a stylesheet-referenced image under its package path.
    ///
    /// Paths that resolve under `Images/` share the page-image map, so a
    /// page image and a stylesheet image with the same path have one source.
    pub fn register_css_asset(&mut self, path: &str, url: &str) -> bool {
        match path.strip_prefix("Images/") {
            Some(relative) => self.images.insert(relative, url),
            None => self.css_assets.insert(path, url),
        }
    }

    /// Whether `path` is already claimed by a page or stylesheet image.
    #[must_use]
    pub fn is_image_path(&self, path: &str) -> bool {
        self.css_assets.contains(path)
            || path
                .strip_prefix("Images/")
                .is_some_and(|relative| self.images.contains(relative))
    }

    /// Page images keyed by path relative to `Images/`.
    #[must_use]
    pub fn images(&self) -> &AssetMap {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut AssetMap {
        &mut self.images
    }

    #[must_use]
    pub fn fonts(&self) -> &AssetMap {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut AssetMap {
        &mut self.fonts
    }

    /// Stylesheet-referenced images keyed by package path.
    #[must_use]
    pub fn css_assets(&self) -> &AssetMap {
        &self.css_assets
    }

    pub fn css_assets_mut(&mut self) -> &mut AssetMap {
        &mut self.css_assets
    }
}
