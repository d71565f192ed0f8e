use std::io::{Cursor, Seek, Write};

/// Writes interleaved `[-1, 1]` samples as 16-bit PCM WAV.
pub fn write_wav<W: Write + Seek>(
    writer: W,
    samples: &[f32],
    sample_rate_hz: u32,
    channels: u16,
) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut wav = hound::WavWriter::new(writer, spec)?;
    for &s in samples {
        wav.write_sample((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
    }
    wav.finalize()
}

pub fn encode_wav(
    samples: &[f32],
    sample_rate_hz: u32,
    channels: u16,
) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav(&mut cursor, samples, sample_rate_hz, channels)?;
    Ok(cursor.into_inner())
}
