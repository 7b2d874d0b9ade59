use byteorder::{ByteOrder, LittleEndian};

/// Songbird decodes every speaker to interleaved 48 kHz stereo.
pub const DECODED_CHANNELS: usize = 2;

/// Mono samples in one 20 ms voice tick at 48 kHz.
pub const SAMPLES_PER_TICK: usize = 960;

pub fn stereo_to_mono(stereo: &[i16]) -> Vec<i16> {
    stereo
        .chunks(DECODED_CHANNELS)
        .map(|chunk| {
            if chunk.len() == 2 {
                ((chunk[0] as i32 + chunk[1] as i32) / 2) as i16
            } else {
                chunk[0]
            }
        })
        .collect()
}

/// Packs samples as little-endian 16-bit PCM.
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_to_mono_averages_pairs() {
        let mono = stereo_to_mono(&[100, 300, -200, 200, i16::MAX, i16::MAX]);
        assert_eq!(mono, vec![200, 0, i16::MAX]);
    }

    #[test]
    fn test_stereo_to_mono_odd_tail() {
        assert_eq!(stereo_to_mono(&[10, 20, 7]), vec![15, 7]);
    }

    #[test]
    fn test_pcm_bytes_little_endian() {
        assert_eq!(pcm_bytes(&[1, -2, 0x1234]), vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
    }
}
