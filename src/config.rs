//! Runtime configuration
//!
//! Everything comes from the environment so the compositor can be pointed at
//! another card or another libdrm/libgbm build without recompiling.

use std::path::PathBuf;
use std::time::Duration;

use log::warn;

/// Card to drive
pub const DEFAULT_DEVICE: &str = "/dev/dri/card0";
pub const DEFAULT_GBM_LIBRARY: &str = "libgbm.so.1";
pub const DEFAULT_DRM_LIBRARY: &str = "libdrm.so.2";
/// Preloaded with global symbol visibility for Mesa DRI drivers
pub const DEFAULT_GLAPI_LIBRARY: &str = "libglapi.so.0";
pub const DEFAULT_REFRESH_HZ: u32 = 60;

/// Compositor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// DRM card node
    pub device: PathBuf,
    pub gbm_library: String,
    pub drm_library: String,
    /// `None` skips the glapi preload
    pub glapi_library: Option<String>,
    /// Interval between flip requests
    pub refresh: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            gbm_library: DEFAULT_GBM_LIBRARY.to_string(),
            drm_library: DEFAULT_DRM_LIBRARY.to_string(),
            glapi_library: Some(DEFAULT_GLAPI_LIBRARY.to_string()),
            refresh: refresh_interval(DEFAULT_REFRESH_HZ),
        }
    }
}

impl Config {
    /// Read the configuration from `WLKMS_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from `lookup`, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(device) = lookup("WLKMS_DEVICE") {
            config.device = PathBuf::from(device);
        }
        if let Some(library) = lookup("WLKMS_GBM_LIBRARY") {
            config.gbm_library = library;
        }
        if let Some(library) = lookup("WLKMS_DRM_LIBRARY") {
            config.drm_library = library;
        }
        if let Some(library) = lookup("WLKMS_GLAPI_LIBRARY") {
            config.glapi_library = (!library.is_empty()).then_some(library);
        }
        if let Some(hz) = lookup("WLKMS_REFRESH_HZ") {
            match hz.trim().parse::<u32>() {
                Ok(hz) if hz > 0 => config.refresh = refresh_interval(hz),
                _ => warn!("Ignoring invalid WLKMS_REFRESH_HZ '{}'", hz),
            }
        }

        config
    }
}

fn refresh_interval(hz: u32) -> Duration {
    Duration::from_secs(1) / hz
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.device, PathBuf::from("/dev/dri/card0"));
        assert_eq!(config.gbm_library, "libgbm.so.1");
        assert_eq!(config.drm_library, "libdrm.so.2");
        assert_eq!(config.glapi_library.as_deref(), Some("libglapi.so.0"));
        assert_eq!(config.refresh, Duration::from_nanos(16_666_666));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("WLKMS_DEVICE", "/dev/dri/card1"),
            ("WLKMS_DRM_LIBRARY", "libdrm.so"),
            ("WLKMS_GLAPI_LIBRARY", ""),
            ("WLKMS_REFRESH_HZ", "144"),
        ]));
        assert_eq!(config.device, PathBuf::from("/dev/dri/card1"));
        assert_eq!(config.drm_library, "libdrm.so");
        assert_eq!(config.gbm_library, "libgbm.so.1");
        assert!(config.glapi_library.is_none());
        assert_eq!(config.refresh, Duration::from_secs(1) / 144);
    }

    #[test]
    fn test_invalid_refresh_keeps_default() {
        for bad in ["0", "fast", "-60"] {
            let config = Config::from_lookup(lookup(&[("WLKMS_REFRESH_HZ", bad)]));
            assert_eq!(config.refresh, Duration::from_secs(1) / 60);
        }
    }
}
