//! Telephony audio conversion and WAV framing
//!
//! Everything here is fixed to the narrowband telephony format the gateway
//! negotiates with the switch: G.711 µ-law payloads at 8 kHz mono, decoded to
//! 16-bit little-endian linear PCM.

/// Negotiated sample rate for both capture and synthesis.
pub const SAMPLE_RATE: u32 = 8000;

/// Duration of one RTP media frame in milliseconds.
pub const FRAME_MS: u32 = 20;

/// Bytes in one 20 ms µ-law frame (one byte per sample at 8 kHz).
pub const ULAW_FRAME_LEN: usize = 160;

/// G.711 µ-law expansion table, indexed by the wire byte.
static ULAW_DECODE_TABLE: [i16; 256] = build_ulaw_table();

const fn build_ulaw_table() -> [i16; 256] {
    // Standard ITU-T G.711 expansion: complement, split into sign, 3-bit
    // exponent and 4-bit mantissa, re-apply the 0x84 bias.
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        let u = !(i as u8);
        let exponent = ((u >> 4) & 0x07) as i32;
        let mantissa = (u & 0x0F) as i32;
        let magnitude = (((mantissa << 3) + 0x84) << exponent) - 0x84;
        table[i] = if u & 0x80 != 0 {
            (-magnitude) as i16
        } else {
            magnitude as i16
        };
        i += 1;
    }
    table
}

/// Decode µ-law bytes to 16-bit little-endian PCM.
///
/// Pure and infallible; the output is exactly twice the input length.
pub fn ulaw_to_pcm(ulaw: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(ulaw.len() * 2);
    for &byte in ulaw {
        pcm.extend_from_slice(&ULAW_DECODE_TABLE[byte as usize].to_le_bytes());
    }
    pcm
}

/// PCM WAV format parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// The gateway's canonical recording format: 8 kHz, 16-bit, mono.
    pub fn telephony() -> Self {
        Self {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
        }
    }

    fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }

    fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Prepend a 44-byte canonical PCM RIFF/WAVE header to `pcm`.
    ///
    /// The caller is responsible for `pcm` actually matching the declared
    /// format; the header is written from the spec alone.
    pub fn wrap(&self, pcm: &[u8]) -> Vec<u8> {
        let data_len = pcm.len() as u32;
        let mut out = Vec::with_capacity(44 + pcm.len());
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.byte_rate().to_le_bytes());
        out.extend_from_slice(&self.block_align().to_le_bytes());
        out.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend_from_slice(pcm);
        out
    }

    /// Parse a canonical header produced by [`WavSpec::wrap`], returning the
    /// declared spec and the data payload.
    pub fn parse(bytes: &[u8]) -> std::result::Result<(WavSpec, &[u8]), WavParseError> {
        if bytes.len() < 44 {
            return Err(WavParseError::TooShort);
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" || &bytes[12..16] != b"fmt " {
            return Err(WavParseError::BadMagic);
        }
        let audio_format = u16::from_le_bytes([bytes[20], bytes[21]]);
        if audio_format != 1 {
            return Err(WavParseError::NotPcm(audio_format));
        }
        let spec = WavSpec {
            channels: u16::from_le_bytes([bytes[22], bytes[23]]),
            sample_rate: u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            bits_per_sample: u16::from_le_bytes([bytes[34], bytes[35]]),
        };
        let data_len =
            u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]) as usize;
        let data = &bytes[44..];
        if data.len() < data_len {
            return Err(WavParseError::Truncated {
                declared: data_len,
                actual: data.len(),
            });
        }
        Ok((spec, &data[..data_len]))
    }
}

/// Errors from [`WavSpec::parse`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WavParseError {
    #[error("buffer shorter than a WAV header")]
    TooShort,
    #[error("missing RIFF/WAVE/fmt magic")]
    BadMagic,
    #[error("unsupported audio format tag {0} (expected PCM)")]
    NotPcm(u16),
    #[error("data chunk truncated: declared {declared} bytes, got {actual}")]
    Truncated { declared: usize, actual: usize },
}
