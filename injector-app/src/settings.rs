//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use injector_core::InjectorConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_output_device: Option<String>,
    /// WAV file streamed when no path is given on the command line.
    pub source_path: Option<PathBuf>,
    pub capacity_frames: usize,
    pub render_quantum: usize,
    pub staging_capacity_frames: usize,
    pub init_timeout_ms: u64,
    /// Frames per decoded chunk handed to the sample sink.
    pub decode_chunk_frames: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        let core = InjectorConfig::default();
        Self {
            preferred_output_device: None,
            source_path: None,
            capacity_frames: core.capacity_frames,
            render_quantum: core.render_quantum,
            staging_capacity_frames: core.staging_capacity_frames,
            init_timeout_ms: core.init_timeout_ms,
            decode_chunk_frames: 4_096,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.capacity_frames = self.capacity_frames.clamp(1_024, 44_100 * 20);
        self.render_quantum = self
            .render_quantum
            .clamp(32, 4_096)
            .min(self.capacity_frames);
        self.staging_capacity_frames = self.staging_capacity_frames.clamp(4_096, 1 << 22);
        self.init_timeout_ms = self.init_timeout_ms.clamp(100, 30_000);
        self.decode_chunk_frames = self.decode_chunk_frames.clamp(64, 65_536);
        self.preferred_output_device = self
            .preferred_output_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.source_path = self
            .source_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
    }

    /// Core session config for a source with `channels` interleaved channels.
    pub fn injector_config(&self, channels: usize) -> InjectorConfig {
        InjectorConfig {
            capacity_frames: self.capacity_frames,
            channels,
            render_quantum: self.render_quantum,
            staging_capacity_frames: self.staging_capacity_frames,
            init_timeout_ms: self.init_timeout_ms,
        }
    }
}

/// Apply `INJECTOR_*` overrides read through `lookup`, then re-normalize.
///
/// Unparseable numeric values are ignored.
pub fn apply_overrides<F>(settings: &mut AppSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(device) = lookup("INJECTOR_OUTPUT_DEVICE") {
        settings.preferred_output_device = Some(device);
    }
    if let Some(source) = lookup("INJECTOR_SOURCE") {
        settings.source_path = Some(PathBuf::from(source));
    }
    if let Some(v) = lookup("INJECTOR_CAPACITY_FRAMES").and_then(|v| v.trim().parse().ok()) {
        settings.capacity_frames = v;
    }
    if let Some(v) = lookup("INJECTOR_RENDER_QUANTUM").and_then(|v| v.trim().parse().ok()) {
        settings.render_quantum = v;
    }
    if let Some(v) = lookup("INJECTOR_INIT_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
        settings.init_timeout_ms = v;
    }
    settings.normalize();
}

pub fn apply_env_overrides(settings: &mut AppSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Injector")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("injector")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut settings = AppSettings {
            capacity_frames: 10,
            render_quantum: 1_000_000,
            init_timeout_ms: 0,
            preferred_output_device: Some("   ".into()),
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.capacity_frames, 1_024);
        assert_eq!(settings.render_quantum, 1_024);
        assert_eq!(settings.init_timeout_ms, 100);
        assert_eq!(settings.preferred_output_device, None);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"renderQuantum": 256}"#).expect("parse");
        assert_eq!(settings.render_quantum, 256);
        assert_eq!(settings.capacity_frames, 88_200);
    }

    #[test]
    fn env_overrides_win_and_bad_numbers_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("INJECTOR_OUTPUT_DEVICE", "Headphones"),
            ("INJECTOR_RENDER_QUANTUM", "256"),
            ("INJECTOR_CAPACITY_FRAMES", "lots"),
        ]
        .into_iter()
        .collect();
        let mut settings = AppSettings::default();
        apply_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.preferred_output_device.as_deref(), Some("Headphones"));
        assert_eq!(settings.render_quantum, 256);
        assert_eq!(settings.capacity_frames, 88_200);
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let path = std::env::temp_dir()
            .join(format!("injector-settings-{}", std::process::id()))
            .join("settings.json");
        let settings = AppSettings {
            preferred_output_device: Some("Speakers".into()),
            render_quantum: 512,
            ..AppSettings::default()
        };
        save_settings(&path, &settings).expect("save");
        assert_eq!(load_settings(&path), settings);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn injector_config_carries_source_channels() {
        let config = AppSettings::default().injector_config(2);
        assert_eq!(config.channels, 2);
        assert_eq!(config.render_quantum, 128);
    }
}
