//! Measurement fragment aggregation.

use std::collections::HashMap;

/// Collects notification fragments per device until flushed.
///
/// Every payload byte becomes one two-character lowercase hex token. A
/// flush joins the device's tokens with commas and discards the buffer, so
/// each measurement starts clean.
#[derive(Debug, Default)]
pub struct MeasurementAggregator {
    buffers: HashMap<String, Vec<String>>,
}

impl MeasurementAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fragment to a device's buffer, in arrival order.
    pub fn append_fragment(&mut self, address: &str, payload: &[u8]) {
        let buffer = self.buffers.entry(address.to_string()).or_default();
        buffer.extend(payload.iter().map(|b| format!("{b:02x}")));
    }

    /// Join and discard a device's buffer. A device with no fragments
    /// flushes to an empty string.
    pub fn flush(&mut self, address: &str) -> String {
        match self.buffers.remove(address) {
            Some(tokens) => tokens.join(","),
            None => String::new(),
        }
    }

    /// Number of tokens currently buffered for a device.
    pub fn pending(&self, address: &str) -> usize {
        self.buffers.get(address).map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_joins_tokens_with_commas() {
        let mut aggregator = MeasurementAggregator::new();
        aggregator.append_fragment("AA", &[0x01]);
        aggregator.append_fragment("AA", &[0x02]);
        aggregator.append_fragment("AA", &[0xff]);
        assert_eq!(aggregator.flush("AA"), "01,02,ff");
        assert_eq!(aggregator.pending("AA"), 0);
    }

    #[test]
    fn test_multi_byte_fragment_splits_into_tokens() {
        let mut aggregator = MeasurementAggregator::new();
        aggregator.append_fragment("AA", &[0xab, 0xcd]);
        assert_eq!(aggregator.flush("AA"), "ab,cd");
    }

    #[test]
    fn test_flush_discards_buffer() {
        let mut aggregator = MeasurementAggregator::new();
        aggregator.append_fragment("AA", &[0x01]);
        aggregator.flush("AA");
        assert_eq!(aggregator.flush("AA"), "");
    }

    #[test]
    fn test_devices_do_not_share_buffers() {
        let mut aggregator = MeasurementAggregator::new();
        aggregator.append_fragment("AA", &[0x01]);
        aggregator.append_fragment("BB", &[0x02]);
        assert_eq!(aggregator.flush("AA"), "01");
        assert_eq!(aggregator.flush("BB"), "02");
    }
}
