//! RIFF/WAVE encoding for evidence files.
//!
//! Always emits the canonical 44-byte PCM header: a 16-byte `fmt ` chunk
//! followed directly by the `data` chunk.

use super::format::FrameFormat;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};

pub const WAV_HEADER_LEN: usize = 44;

/// Largest PCM body whose RIFF chunk size still fits in a `u32`.
pub const MAX_DATA_LEN: usize = (u32::MAX - 36) as usize;

const PCM_FORMAT_TAG: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

pub fn write_header<W: Write>(writer: &mut W, format: FrameFormat, data_len: u32) -> io::Result<()> {
    let riff_len = data_len
        .checked_add(36)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "PCM data too large for WAV"))?;

    writer.write_all(b"RIFF")?;
    writer.write_u32::<LittleEndian>(riff_len)?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_u32::<LittleEndian>(FMT_CHUNK_LEN)?;
    writer.write_u16::<LittleEndian>(PCM_FORMAT_TAG)?;
    writer.write_u16::<LittleEndian>(format.channels)?;
    writer.write_u32::<LittleEndian>(format.sample_rate)?;
    writer.write_u32::<LittleEndian>(format.bytes_per_second() as u32)?;
    writer.write_u16::<LittleEndian>(format.block_align() as u16)?;
    writer.write_u16::<LittleEndian>(format.bits_per_sample())?;

    writer.write_all(b"data")?;
    writer.write_u32::<LittleEndian>(data_len)?;
    Ok(())
}

/// Header plus PCM body in one buffer.
pub fn encode(format: FrameFormat, pcm: &[u8]) -> io::Result<Vec<u8>> {
    let data_len = u32::try_from(pcm.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "PCM data too large for WAV"))?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    write_header(&mut out, format, data_len)?;
    out.extend_from_slice(pcm);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    #[test]
    fn test_header_layout() {
        let mut header = Vec::new();
        write_header(&mut header, FrameFormat::VOICE, 100).unwrap();

        assert_eq!(header.len(), WAV_HEADER_LEN);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");

        assert_eq!(LittleEndian::read_u32(&header[4..8]), 136);
        assert_eq!(LittleEndian::read_u32(&header[16..20]), 16);
        assert_eq!(LittleEndian::read_u16(&header[20..22]), 1);
        assert_eq!(LittleEndian::read_u16(&header[22..24]), 1);
        assert_eq!(LittleEndian::read_u32(&header[24..28]), 48_000);
        assert_eq!(LittleEndian::read_u32(&header[28..32]), 96_000);
        assert_eq!(LittleEndian::read_u16(&header[32..34]), 2);
        assert_eq!(LittleEndian::read_u16(&header[34..36]), 16);
        assert_eq!(LittleEndian::read_u32(&header[40..44]), 100);
    }

    #[test]
    fn test_encode_hundred_bytes() {
        let pcm: Vec<u8> = (0..100).collect();
        let wav = encode(FrameFormat::VOICE, &pcm).unwrap();

        assert_eq!(wav.len(), 144);
        assert_eq!(&wav[4..8], &136u32.to_le_bytes());
        assert_eq!(&wav[40..44], &100u32.to_le_bytes());
        assert_eq!(&wav[44..], &pcm[..]);
    }

    #[test]
    fn test_stereo_derived_fields() {
        let mut header = Vec::new();
        write_header(&mut header, FrameFormat::new(44_100, 2, 2), 0).unwrap();

        assert_eq!(LittleEndian::read_u32(&header[4..8]), 36);
        assert_eq!(LittleEndian::read_u32(&header[28..32]), 176_400);
        assert_eq!(LittleEndian::read_u16(&header[32..34]), 4);
    }

    #[test]
    fn test_hound_reads_encoded_samples() {
        let samples: [i16; 4] = [0, 1000, -1000, i16::MAX];
        let mut pcm = vec![0u8; samples.len() * 2];
        LittleEndian::write_i16_into(&samples, &mut pcm);

        let wav = encode(FrameFormat::VOICE, &pcm).unwrap();
        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);

        let decoded: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(decoded, samples);
    }
}
