//! Typed audio fragment passed from the feed API to the chunker.

/// One externally-submitted chunk of raw interleaved PCM bytes
/// (little-endian signed 16-bit, any channel count).
///
/// Fragments arrive at arbitrary length and arbitrary alignment; a
/// trailing odd byte carries half a sample and is dropped on conversion.
#[derive(Debug, Clone)]
pub struct AudioFragment {
    bytes: Vec<u8>,
}

impl AudioFragment {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Returns the raw byte length of this fragment.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the fragment contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the fragment into interior `i16` samples.
    ///
    /// Yields `floor(byte_len / 2)` samples; a trailing odd byte is dropped.
    pub fn to_samples(&self) -> Vec<i16> {
        self.bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }
}

impl From<Vec<u8>> for AudioFragment {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Re-encode `i16` samples as the little-endian byte stream a playback
/// sink consumes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
