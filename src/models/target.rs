use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Media category a watched folder belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Images,
    Videos,
    Gifs,
    Stickers,
    Audio,
    VoiceNotes,
    Documents,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Images,
        Category::Videos,
        Category::Gifs,
        Category::Stickers,
        Category::Audio,
        Category::VoiceNotes,
        Category::Documents,
    ];

    /// Directory name used inside the backup and recovery stores
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Images => "images",
            Category::Videos => "videos",
            Category::Gifs => "gifs",
            Category::Stickers => "stickers",
            Category::Audio => "audio",
            Category::VoiceNotes => "voice_notes",
            Category::Documents => "documents",
        }
    }

    /// Suffix of the external app's media folder, e.g. "WhatsApp Voice Notes"
    pub fn folder_suffix(&self) -> &'static str {
        match self {
            Category::Images => "Images",
            Category::Videos => "Video",
            Category::Gifs => "Animated Gifs",
            Category::Stickers => "Stickers",
            Category::Audio => "Audio",
            Category::VoiceNotes => "Voice Notes",
            Category::Documents => "Documents",
        }
    }

    /// File extensions listed for this category (lowercase, without dot)
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Category::Images => &["jpg", "jpeg", "png", "bmp", "webp"],
            Category::Videos => &["mp4", "mkv", "3gp", "webm"],
            Category::Gifs => &["mp4", "gif"],
            Category::Stickers => &["webp"],
            Category::Audio => &["mp3", "wav", "aac", "m4a", "opus"],
            Category::VoiceNotes => &["opus", "ogg", "m4a"],
            Category::Documents => &[
                "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "zip", "rar",
            ],
        }
    }

    /// Categories whose content lives in the newest dated subfolder
    pub fn is_rolling(&self) -> bool {
        matches!(self, Category::VoiceNotes)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// Which install of the external app a folder belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Primary,
    Secondary,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Primary, Variant::Secondary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Primary => "primary",
            Variant::Secondary => "secondary",
        }
    }

    /// Package directory of this install under the restricted media area
    pub fn package(&self) -> &'static str {
        match self {
            Variant::Primary => "com.whatsapp",
            Variant::Secondary => "com.whatsapp.w4b",
        }
    }

    /// Product directory name, also the prefix of every media folder
    pub fn product(&self) -> &'static str {
        match self {
            Variant::Primary => "WhatsApp",
            Variant::Secondary => "WhatsApp Business",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "whatsapp" => Ok(Variant::Primary),
            "secondary" | "business" | "w4b" => Ok(Variant::Secondary),
            _ => Err(format!("Unknown variant: {}", s)),
        }
    }
}

/// How bytes of files in a watched folder are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Plain path-based open
    Direct,
    /// Hierarchical lookup through the persisted granted handle
    ViaGrantedHandle,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Direct => f.write_str("direct"),
            AccessMode::ViaGrantedHandle => f.write_str("granted-handle"),
        }
    }
}

/// Which OS watch primitive an observer arms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPrimitive {
    /// Native watcher; create, modify, moved-to and delete only
    Legacy,
    /// Native watcher; directory attribute/access events also trigger rescans
    Extended,
    /// Periodic scanning for platforms where native notifications are unavailable
    Polling(Duration),
}

impl WatchPrimitive {
    /// Whether directory attribute/access events are consumed as rescan triggers
    pub fn consumes_directory_access(&self) -> bool {
        !matches!(self, WatchPrimitive::Legacy)
    }
}

impl fmt::Display for WatchPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchPrimitive::Legacy => f.write_str("legacy"),
            WatchPrimitive::Extended => f.write_str("extended"),
            WatchPrimitive::Polling(interval) => write!(f, "polling({}ms)", interval.as_millis()),
        }
    }
}

/// One directory the engine watches. Immutable once built by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub category: Category,
    pub variant: Variant,
    pub access_mode: AccessMode,
    /// Content lives in the most recently modified immediate subdirectory
    pub rolling: bool,
}

impl WatchTarget {
    pub fn new(
        path: impl Into<PathBuf>,
        category: Category,
        variant: Variant,
        access_mode: AccessMode,
        rolling: bool,
    ) -> Self {
        Self {
            path: path.into(),
            category,
            variant,
            access_mode,
            rolling,
        }
    }

    /// Short label for log fields
    pub fn label(&self) -> String {
        format!("{}/{}", self.variant, self.category)
    }
}
