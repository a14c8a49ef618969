//! WAV encoding and decoding for PCM audio.

use std::io::Write;

use sb_engine::Frame;
use sb_ir::{LoopType, RawAudio};

use crate::FormatError;

// --- Writing ---

/// Encode 16-bit stereo frames as a complete WAV file.
pub fn encode_wav(frames: &[Frame], sample_rate: u32) -> Vec<u8> {
    let num_channels: u16 = 2;
    let bits_per_sample: u16 = 16;
    let block_align = num_channels * (bits_per_sample / 8);
    let data_size = frames.len() as u32 * block_align as u32;

    let mut buf = Vec::with_capacity(44 + data_size as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&num_channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for frame in frames {
        buf.extend_from_slice(&frame.left.to_le_bytes());
        buf.extend_from_slice(&frame.right.to_le_bytes());
    }
    buf
}

pub fn write_wav(
    w: &mut impl Write,
    frames: &[Frame],
    sample_rate: u32,
) -> Result<(), FormatError> {
    w.write_all(&encode_wav(frames, sample_rate))?;
    Ok(())
}

// --- Reading ---

/// A decoded WAV file, ready to hand to the sample memory manager.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedWav {
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    /// 16-bit PCM, interleaved when stereo.
    pub pcm: Vec<i16>,
    /// First loop from a `smpl` chunk, as a half-open frame range.
    pub loop_range: Option<(usize, usize)>,
}

impl DecodedWav {
    pub fn frames(&self) -> usize {
        self.pcm.len() / self.channels.max(1) as usize
    }

    /// Borrow as load input, keeping any embedded loop.
    pub fn as_raw(&self) -> RawAudio<'_> {
        let raw = RawAudio {
            name: &self.name,
            pcm: &self.pcm,
            channels: self.channels,
            sample_rate: self.sample_rate,
            loop_type: LoopType::None,
            loop_start: 0,
            loop_end: 0,
        };
        match self.loop_range {
            Some((start, end)) => raw.looped(start, end),
            None => raw,
        }
    }
}

/// Decode an 8- or 16-bit PCM WAV file, mono or stereo.
pub fn load_wav(data: &[u8], name: &str) -> Result<DecodedWav, FormatError> {
    let header = parse_header(data)?;
    let end = (header.data_offset + header.data_size).min(data.len());
    let raw = &data[header.data_offset..end];

    let pcm = match header.bits_per_sample {
        8 => read_8bit(raw),
        _ => read_16bit(raw),
    };
    let frames = pcm.len() / header.num_channels as usize;
    let loop_range = header.loop_range.filter(|&(start, end)| start < end && end <= frames);
    if header.loop_range.is_some() && loop_range.is_none() {
        tracing::warn!(name, frames, "ignoring loop that does not fit the sample data");
    }

    Ok(DecodedWav {
        name: name.to_string(),
        channels: header.num_channels,
        sample_rate: header.sample_rate,
        pcm,
        loop_range,
    })
}

struct WavHeader {
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    data_offset: usize,
    data_size: usize,
    loop_range: Option<(usize, usize)>,
}

fn parse_header(data: &[u8]) -> Result<WavHeader, FormatError> {
    if data.len() < 12 {
        return Err(FormatError::UnexpectedEof);
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(FormatError::InvalidHeader);
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u32, u16)> = None;
    let mut data_chunk: Option<(usize, usize)> = None;
    let mut loop_range = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32_le(data, pos + 4) as usize;
        let body = pos + 8;

        if chunk_id == b"fmt " && chunk_size >= 16 && body + 16 <= data.len() {
            let format = read_u16_le(data, body);
            if format != 1 {
                return Err(FormatError::Unsupported(format!("WAV format tag {format}")));
            }
            let channels = read_u16_le(data, body + 2);
            let rate = read_u32_le(data, body + 4);
            let bits = read_u16_le(data, body + 14);
            fmt = Some((channels, rate, bits));
        } else if chunk_id == b"data" {
            data_chunk = Some((body, chunk_size));
        } else if chunk_id == b"smpl" && chunk_size >= 60 && body + 60 <= data.len() {
            let loops = read_u32_le(data, body + 28);
            if loops > 0 {
                let start = read_u32_le(data, body + 44) as usize;
                // Stored end is inclusive
                let end = read_u32_le(data, body + 48) as usize + 1;
                loop_range = Some((start, end));
            }
        }

        pos = body.saturating_add(chunk_size);
        if pos % 2 != 0 {
            pos += 1;
        }
    }

    let (num_channels, sample_rate, bits_per_sample) = fmt.ok_or(FormatError::InvalidHeader)?;
    let (data_offset, data_size) = data_chunk.ok_or(FormatError::UnexpectedEof)?;

    if bits_per_sample != 8 && bits_per_sample != 16 {
        return Err(FormatError::Unsupported(format!("{bits_per_sample}-bit PCM")));
    }
    if !(1..=2).contains(&num_channels) {
        return Err(FormatError::Unsupported(format!("{num_channels} channels")));
    }

    Ok(WavHeader {
        num_channels,
        sample_rate,
        bits_per_sample,
        data_offset,
        data_size,
        loop_range,
    })
}

/// 8-bit WAV is unsigned with 128 as center.
fn read_8bit(raw: &[u8]) -> Vec<i16> {
    raw.iter().map(|&b| (b as i16 - 128) << 8).collect()
}

fn read_16bit(raw: &[u8]) -> Vec<i16> {
    raw.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
