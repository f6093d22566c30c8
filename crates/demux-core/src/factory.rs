//! Demuxer selection by container kind

use std::fmt;
use std::str::FromStr;

use rplay_codec_core::VideoCodec;
use serde::{Deserialize, Serialize};

use crate::error::{DemuxError, Result};
use crate::flv::FlvDemuxer;
use crate::fmp4::{Fmp4Demuxer, XorDescrambler};
use crate::mpeg4::Mpeg4Demuxer;
use crate::naked::{NakedFlowDemuxer, DEFAULT_FPS};
use crate::traits::Demuxer;
use crate::ts::TsDemuxer;

/// Container formats the player can parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Flash video
    #[default]
    Flv,
    /// MPEG-2 transport stream
    Ts,
    /// Fragmented ISO base media
    Fmp4,
    /// MPEG-4 Part 2 visual elementary stream
    Mpeg4,
    /// Raw H.264/H.265 Annex-B elementary stream
    NakedFlow,
}

impl ContainerKind {
    /// Every supported kind
    pub const ALL: [ContainerKind; 5] = [
        ContainerKind::Flv,
        ContainerKind::Ts,
        ContainerKind::Fmp4,
        ContainerKind::Mpeg4,
        ContainerKind::NakedFlow,
    ];

    /// Configuration name of the kind
    pub fn name(self) -> &'static str {
        match self {
            Self::Flv => "flv",
            Self::Ts => "ts",
            Self::Fmp4 => "fmp4",
            Self::Mpeg4 => "mpeg4",
            Self::NakedFlow => "naked_flow",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContainerKind {
    type Err = DemuxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flv" => Ok(Self::Flv),
            "ts" | "mpegts" | "m2ts" => Ok(Self::Ts),
            "fmp4" | "mp4" => Ok(Self::Fmp4),
            "mpeg4" | "m4v" => Ok(Self::Mpeg4),
            "naked_flow" | "naked" | "annexb" | "h264" | "h265" => Ok(Self::NakedFlow),
            other => Err(DemuxError::invalid_config(format!("unknown container '{other}'"))),
        }
    }
}

/// Options that only some demuxers use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxerOptions {
    /// Codec of a naked flow; `None` detects it from the first parameter set
    pub naked_flow_codec: Option<VideoCodec>,
    /// Nominal frame rate for streams without timing (naked flow, MPEG-4 visual)
    pub nominal_fps: f64,
    /// XOR key for a scrambled fMP4 transport
    #[serde(with = "hex_key")]
    pub descrambler_key: Option<Vec<u8>>,
}

impl Default for DemuxerOptions {
    fn default() -> Self {
        Self {
            naked_flow_codec: None,
            nominal_fps: DEFAULT_FPS,
            descrambler_key: None,
        }
    }
}

mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match key {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|text| hex::decode(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Builds demuxers
pub struct DemuxerFactory;

impl DemuxerFactory {
    /// Create a demuxer for `kind`
    pub fn create(kind: ContainerKind, options: &DemuxerOptions) -> Result<Box<dyn Demuxer>> {
        if options.descrambler_key.is_some() && kind != ContainerKind::Fmp4 {
            return Err(DemuxError::invalid_config(format!(
                "descrambling is only supported for fmp4, not {kind}"
            )));
        }
        match kind {
            ContainerKind::Flv => Ok(Box::new(FlvDemuxer::new())),
            ContainerKind::Ts => Ok(Box::new(TsDemuxer::new())),
            ContainerKind::Fmp4 => match &options.descrambler_key {
                Some(key) => {
                    let descrambler = XorDescrambler::new(key.clone())?;
                    Ok(Box::new(Fmp4Demuxer::with_descrambler(Box::new(descrambler))))
                }
                None => Ok(Box::new(Fmp4Demuxer::new())),
            },
            ContainerKind::Mpeg4 => Ok(Box::new(Mpeg4Demuxer::new(options.nominal_fps)?)),
            ContainerKind::NakedFlow => Ok(Box::new(NakedFlowDemuxer::new(
                options.naked_flow_codec,
                options.nominal_fps,
            )?)),
        }
    }

    /// Create a demuxer from a container name
    pub fn create_by_name(name: &str, options: &DemuxerOptions) -> Result<Box<dyn Demuxer>> {
        Self::create(name.parse()?, options)
    }

    /// Whether `name` names a supported container
    pub fn is_supported(name: &str) -> bool {
        name.parse::<ContainerKind>().is_ok()
    }
}
