//! Shared types used across the asset model, the cache and the driver.

use std::fmt;
use std::path::Path;

/// The four kinds of compilable resources.
///
/// The kind decides which source/target roots an asset lives under, which
/// macro syntax its text is tokenized with, and how its target file is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Markup,
    Stylesheet,
    Script,
    Image,
}

impl ResourceKind {
    /// All kinds, in discovery order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Markup,
        ResourceKind::Stylesheet,
        ResourceKind::Script,
        ResourceKind::Image,
    ];

    /// File extensions (lowercase, no dot) recognised for this kind.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Markup => &["html"],
            ResourceKind::Stylesheet => &["css", "scss", "sass"],
            ResourceKind::Script => &["js", "coffee"],
            ResourceKind::Image => &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico"],
        }
    }

    /// Classify a path by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }

    /// Directory name used for this kind under the partials area.
    pub fn dir_name(self) -> &'static str {
        match self {
            ResourceKind::Markup => "html",
            ResourceKind::Stylesheet => "stylesheets",
            ResourceKind::Script => "scripts",
            ResourceKind::Image => "images",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Markup => "markup",
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Script => "script",
            ResourceKind::Image => "image",
        };
        f.write_str(name)
    }
}
