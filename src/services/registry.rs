//! Watch target registry
//!
//! Built once at engine start from the external app's known folder layout
//! and never mutated afterwards.

use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::models::{Category, Variant, WatchTarget};

#[derive(Debug, Clone, Default)]
pub struct WatchRegistry {
    targets: Vec<WatchTarget>,
}

impl WatchRegistry {
    /// Every (variant, category) folder of the external app, with its access
    /// mode decided here once
    pub fn build(config: &EngineConfig) -> Self {
        let mut targets = Vec::new();

        for variant in Variant::ALL {
            for category in Category::ALL {
                let path = scoped_folder(config, variant, category);
                let access_mode = config.access_mode_for(&path);
                targets.push(WatchTarget::new(
                    path,
                    category,
                    variant,
                    access_mode,
                    category.is_rolling(),
                ));
            }
        }

        if config.platform.uses_legacy_layout() {
            for variant in Variant::ALL {
                for category in Category::ALL {
                    let path = legacy_folder(config, variant, category);
                    let access_mode = config.access_mode_for(&path);
                    targets.push(WatchTarget::new(
                        path,
                        category,
                        variant,
                        access_mode,
                        category.is_rolling(),
                    ));
                }
            }
        }

        Self { targets }
    }

    pub fn from_targets(targets: Vec<WatchTarget>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn media_folder_name(variant: Variant, category: Category) -> String {
    format!("{} {}", variant.product(), category.folder_suffix())
}

/// `<restricted>/<package>/<product>/Media/<product> <suffix>`
fn scoped_folder(config: &EngineConfig, variant: Variant, category: Category) -> PathBuf {
    config
        .restricted_root()
        .join(variant.package())
        .join(variant.product())
        .join("Media")
        .join(media_folder_name(variant, category))
}

/// `<external>/<product>/Media/<product> <suffix>`
fn legacy_folder(config: &EngineConfig, variant: Variant, category: Category) -> PathBuf {
    config
        .external_root
        .join(variant.product())
        .join("Media")
        .join(media_folder_name(variant, category))
}
