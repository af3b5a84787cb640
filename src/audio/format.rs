//! Stream format negotiation
//!
//! The target format is a fixed lookup on the downmix flag: 48 kHz, 16-bit
//! integer PCM, either stereo or 7.1. Hardware-supported formats are not
//! queried; if the host rejects this format, the open fails.

use crate::audio::types::{ChannelMask, SampleType, StreamFormat};
use crate::config::OutputConfig;

pub const SAMPLE_RATE: u32 = 48000;
pub const BITS_PER_SAMPLE: u16 = 16;

/// Build the stream format for `config`
pub fn build_format(config: &OutputConfig) -> StreamFormat {
    let channel_mask = if config.downmix_to_2ch {
        ChannelMask::STEREO
    } else {
        ChannelMask::SURROUND_7_1
    };

    StreamFormat {
        channels: channel_mask.channel_count(),
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        valid_bits_per_sample: BITS_PER_SAMPLE,
        channel_mask,
        sample_type: SampleType::Pcm,
    }
}
