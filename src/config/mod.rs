mod types;

pub use types::*;

use anyhow::{Context, Result};
use segmux_media::AudioTrack;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from the given path, `./segmux.toml`, or defaults
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_path = Path::new("./segmux.toml");
    if default_path.exists() {
        return load_config(default_path);
    }

    Ok(Config::default())
}

/// Reject configurations the muxer cannot run with
pub fn validate_config(config: &Config) -> Result<()> {
    let muxer = &config.muxer;
    if muxer.segment_duration_ms == 0 {
        anyhow::bail!("muxer.segment_duration_ms cannot be 0");
    }
    if muxer.part_duration_ms == 0 {
        anyhow::bail!("muxer.part_duration_ms cannot be 0");
    }
    if muxer.segment_max_size == 0 {
        anyhow::bail!("muxer.segment_max_size cannot be 0");
    }

    let synthetic = &config.synthetic;
    if !synthetic.video && !synthetic.audio {
        anyhow::bail!("synthetic source needs at least one of video or audio");
    }
    if synthetic.video {
        if synthetic.fps == 0 {
            anyhow::bail!("synthetic.fps cannot be 0");
        }
        if synthetic.gop_frames == 0 {
            anyhow::bail!("synthetic.gop_frames cannot be 0");
        }
        if synthetic.frame_size < 2 {
            anyhow::bail!("synthetic.frame_size must be at least 2 bytes");
        }
    }
    if synthetic.audio && AudioTrack::aac_lc(synthetic.sample_rate, 2).is_none() {
        anyhow::bail!(
            "synthetic.sample_rate {} is not a valid AAC sampling frequency",
            synthetic.sample_rate
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_temp("");
        let config = load_config(file.path()).unwrap();
        assert!(config.muxer.low_latency);
        assert_eq!(config.muxer.segment_duration_ms, 1000);
        assert_eq!(config.muxer.part_duration_ms, 200);
        assert_eq!(config.muxer.segment_max_size, 50 * 1024 * 1024);
        assert_eq!(config.synthetic.fps, 30);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let file = write_temp(
            r#"
[muxer]
low_latency = false
segment_duration_ms = 2000

[synthetic]
audio = false
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert!(!config.muxer.low_latency);
        assert_eq!(config.muxer.segment_duration_ms, 2000);
        assert_eq!(config.muxer.part_duration_ms, 200);
        assert!(config.synthetic.video);
        assert!(!config.synthetic.audio);

        let segmenter = config.muxer.segmenter_config();
        assert_eq!(segmenter.segment_duration, std::time::Duration::from_secs(2));
        assert!(!segmenter.low_latency);
    }

    #[test]
    fn rejects_zero_durations() {
        let file = write_temp("[muxer]\npart_duration_ms = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("part_duration_ms"));
    }

    #[test]
    fn rejects_unsupported_sample_rate() {
        let file = write_temp("[synthetic]\nsample_rate = 12345\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn rejects_empty_source() {
        let file = write_temp("[synthetic]\nvideo = false\naudio = false\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn malformed_toml_reports_path() {
        let file = write_temp("[muxer\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn warns_on_long_parts_and_gop() {
        let mut config = Config::default();
        config.muxer.part_duration_ms = 1500;
        config.synthetic.gop_frames = 60;

        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("part_duration_ms"));
        assert!(warnings[1].contains("GOP"));
    }

    #[test]
    fn warns_when_frames_exceed_budget() {
        let mut config = Config::default();
        config.muxer.segment_max_size = 1000;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("frame_size")));
    }
}
