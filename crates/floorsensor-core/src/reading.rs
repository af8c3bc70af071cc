//! Decoding of the raw sensor characteristic

/// Numeric value of one sensor slot
pub type SensorValue = u16;

/// Ordered slot values of one read; slot 0 is the status word
pub type DecodedReading = Vec<SensorValue>;

/// Reserved slot value meaning "no valid reading"
pub const INVALID_VALUE: SensorValue = SensorValue::MAX;

/// Number of slots reserved per cable, whether or not all are wired
pub const MAX_SENSORS_PER_CABLE: usize = 8;

/// Turns a raw characteristic buffer into slot values.
///
/// Implementations must be total: malformed input yields whatever partial
/// sequence the decoder produces, never an error. Missing or sentinel slots
/// are filtered out during event assembly.
pub trait ReadingDecoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> DecodedReading;
}

/// Decoder for the sentient floor sensor firmware.
///
/// The characteristic is a packed array of little-endian `u16` words. Word 0
/// carries the firmware status, words `1..` are the sensor slots, cable by
/// cable. A trailing odd byte is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentientDecoder;

impl ReadingDecoder for SentientDecoder {
    fn decode(&self, raw: &[u8]) -> DecodedReading {
        raw.chunks_exact(2)
            .map(|word| u16::from_le_bytes([word[0], word[1]]))
            .collect()
    }
}

impl<F> ReadingDecoder for F
where
    F: Fn(&[u8]) -> DecodedReading + Send + Sync,
{
    fn decode(&self, raw: &[u8]) -> DecodedReading {
        self(raw)
    }
}
