//! Read-only media inventory
//!
//! Layout: `<base>/<hero>/<hero>_<id>.mp4` per hero video, plus the fixed
//! greeting and ending clips. The playback child consumes these; the
//! controller only verifies presence at startup and resolves paths.

use crate::infra::Config;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Startup inventory findings
#[derive(Debug, Clone)]
pub struct InventoryReport {
    pub greet_present: bool,
    pub end_present: bool,
    pub hero_count: usize,
}

pub struct MediaLibrary {
    base_path: PathBuf,
    greet_video: PathBuf,
    end_video: PathBuf,
}

impl MediaLibrary {
    pub fn new(config: &Config) -> Self {
        Self {
            base_path: PathBuf::from(config.media_base_path()),
            greet_video: PathBuf::from(config.greet_video()),
            end_video: PathBuf::from(config.end_video()),
        }
    }

    /// Verify the fixed clips and hero directories exist, logging what is
    /// missing. Missing media is a warning, not a startup failure; the
    /// playback workflow has its own local fallbacks.
    pub fn check_inventory(&self) -> InventoryReport {
        let greet_present = self.greet_video.exists();
        if greet_present {
            info!(path = %self.greet_video.display(), "greet_video_found");
        } else {
            warn!(path = %self.greet_video.display(), "greet_video_missing");
        }

        let end_present = self.end_video.exists();
        if end_present {
            info!(path = %self.end_video.display(), "end_video_found");
        } else {
            warn!(path = %self.end_video.display(), "end_video_missing");
        }

        let hero_count = self.hero_count();
        if hero_count > 0 {
            info!(path = %self.base_path.display(), heroes = hero_count, "hero_videos_found");
        } else {
            warn!(path = %self.base_path.display(), "hero_videos_missing");
        }

        InventoryReport { greet_present, end_present, hero_count }
    }

    /// Number of hero directories under the base path
    pub fn hero_count(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.base_path) else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .count()
    }

    /// Resolve a hero video by record id.
    ///
    /// Primary naming is `<hero>_<id>.mp4`; the documented fallbacks
    /// (`<id>.mp4`, `question_<id>.mp4`, spaces replaced by underscores)
    /// are tried in order.
    pub fn video_path(&self, hero_name: &str, record_id: u32) -> Option<PathBuf> {
        let hero = Self::clean_filename(hero_name);
        let hero_dir = self.base_path.join(&hero);

        let candidates = [
            hero_dir.join(format!("{}_{}.mp4", hero, record_id)),
            hero_dir.join(format!("{}.mp4", record_id)),
            hero_dir.join(format!("question_{}.mp4", record_id)),
            hero_dir.join(format!("{}_{}.mp4", hero.replace(' ', "_"), record_id)),
        ];

        for candidate in &candidates {
            if candidate.exists() {
                debug!(path = %candidate.display(), "video_resolved");
                return Some(candidate.clone());
            }
        }

        warn!(hero = %hero_name, record_id = record_id, "video_not_found");
        None
    }

    /// Count the mp4 files in a hero's directory
    pub fn hero_video_count(&self, hero_name: &str) -> usize {
        let hero_dir = self.base_path.join(Self::clean_filename(hero_name));
        count_mp4_files(&hero_dir)
    }

    /// Strip characters the filesystem rejects from a hero name
    fn clean_filename(name: &str) -> String {
        const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
        name.chars().map(|c| if INVALID.contains(&c) { '_' } else { c }).collect::<String>()
            .trim()
            .to_string()
    }
}

fn count_mp4_files(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.path().extension().map(|ext| ext.eq_ignore_ascii_case("mp4")).unwrap_or(false)
        })
        .count()
}
