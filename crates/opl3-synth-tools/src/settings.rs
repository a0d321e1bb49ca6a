use std::path::Path;

use anyhow::{Context, Result, bail};
use config::{Config, File};
use opl3_synth::{MidiChannelPatch, SynthConfig};
use serde::Deserialize;

/// Contents of a settings file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Voice manager configuration
    pub synth: SynthConfig,
    /// Patches applied to MIDI channels before playback
    pub patches: Vec<PatchEntry>,
}

/// A patch bound to one MIDI channel
#[derive(Debug, Clone, Deserialize)]
pub struct PatchEntry {
    pub channel: u8,
    #[serde(default)]
    pub patch: MidiChannelPatch,
}

/// Load settings from `path`, or the defaults when no file is given.
///
/// The format is picked from the file extension.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };

    let settings: Settings = Config::builder()
        .add_source(File::from(path))
        .build()
        .with_context(|| format!("failed to read settings file: {}", path.display()))?
        .try_deserialize()
        .with_context(|| format!("invalid settings in {}", path.display()))?;

    let channels = settings.synth.midi_channel_count();
    if let Some(entry) = settings
        .patches
        .iter()
        .find(|entry| entry.channel as usize >= channels)
    {
        bail!(
            "patch for MIDI channel {} but only {} channels are configured",
            entry.channel,
            channels
        );
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use opl3_synth::{ChannelType, Output};

    fn parse(text: &str, format: FileFormat) -> Settings {
        Config::builder()
            .add_source(File::from_str(text, format))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_partial_synth_section() {
        let settings = parse(
            r#"
            [synth]
            percussion = true
            lfo_delay_unit_ms = 100
            "#,
            FileFormat::Toml,
        );
        assert!(settings.synth.percussion);
        assert_eq!(settings.synth.lfo_delay_unit_ms, 100);
        assert_eq!(settings.synth.io_base_address, 0x388);
        assert!(settings.patches.is_empty());
    }

    #[test]
    fn test_patch_entries() {
        let settings = parse(
            r#"
            patches:
              - channel: 9
                patch:
                  channel_type: Kick
              - channel: 0
                patch:
                  channel_type: FourOp
                  algorithm: 2
                  output: Left
                  operators:
                    - level: 63
                    - release_rate: 3
                    - {}
                    - {}
            "#,
            FileFormat::Yaml,
        );
        assert_eq!(settings.patches.len(), 2);
        assert_eq!(settings.patches[0].patch.channel_type, ChannelType::Kick);
        let four = &settings.patches[1].patch;
        assert_eq!(four.algorithm, 2);
        assert_eq!(four.output, Output::Left);
        assert_eq!(four.operators[0].level, 63);
        assert_eq!(four.operators[1].release_rate, 3);
        assert_eq!(four.operators[1].level, 48);
        assert_eq!(four.volume, 63);
    }
}
