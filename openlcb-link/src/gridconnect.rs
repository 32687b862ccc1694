//! GridConnect ASCII framing: `:X19490365N;` / `:X19170365N020112FE056C;`.
//!
//! A line starts with `:X`, carries an 8-hex-digit header, `N` (we don't
//! emit or expect the RTR-marking `R` form), up to 16 hex digits of data,
//! and ends with `;`. Lines may be separated by anything; only `:` start
//! and `;` end matter.

use crate::wire::{CanFrame, Error, Result};

fn hex_nibble(b: u8) -> Result<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        _ => Err(Error::InvalidHex),
    }
}

/// Render one frame as a GridConnect line, CR/LF terminated.
pub fn encode(frame: &CanFrame) -> String {
    let mut out = format!(":X{:08X}N", frame.header);
    for byte in &frame.data {
        out.push_str(&format!("{byte:02X}"));
    }
    out.push_str(";\n");
    out
}

/// Decode a single GridConnect line with no leading `:` or trailing `;`
/// stripped yet, e.g. `X19170365N020112FE056C`.
fn decode_line(line: &[u8]) -> Result<CanFrame> {
    if line.first() != Some(&b'X') {
        return Err(Error::Malformed);
    }
    if line.len() < 1 + 8 + 1 {
        return Err(Error::Malformed);
    }
    let mut header: u32 = 0;
    for &b in &line[1..9] {
        header = (header << 4) | hex_nibble(b)? as u32;
    }
    if line[9] != b'N' {
        return Err(Error::Malformed);
    }
    let hex = &line[10..];
    if hex.len() % 2 != 0 || hex.len() > 16 {
        return Err(Error::Malformed);
    }
    let mut data = Vec::with_capacity(hex.len() / 2);
    for pair in hex.chunks_exact(2) {
        data.push((hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?);
    }
    CanFrame::new(header, data)
}

/// Stateful line assembler for a byte stream that may deliver partial
/// GridConnect lines across multiple reads.
///
/// Mirrors the reference implementation's approach of accumulating raw
/// bytes and re-scanning for `:`...`;` pairs, rather than assuming reads
/// are line-aligned.
#[derive(Debug, Default)]
pub struct GridConnectDecoder {
    buffer: Vec<u8>,
}

impl GridConnectDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-received bytes and drain every complete frame now
    /// available. Malformed lines are logged and skipped; a missing `;`
    /// leaves its bytes buffered for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<CanFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(end) = self.buffer.iter().position(|&b| b == b';') {
            let Some(start) = self.buffer[..end].iter().position(|&b| b == b':') else {
                // junk before the first ':' in this message; drop through it
                self.buffer.drain(..=end);
                continue;
            };
            match decode_line(&self.buffer[start + 1..end]) {
                Ok(frame) => frames.push(frame),
                Err(e) => log::warn!("dropping malformed GridConnect line: {e}"),
            }
            self.buffer.drain(..=end);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_frame_with_data() {
        let frame = CanFrame::new(0x19170365, vec![0x02, 0x01, 0x12, 0xFE, 0x05, 0x6C]).unwrap();
        let line = encode(&frame);
        assert_eq!(line, ":X19170365N020112FE056C;\n");

        let mut decoder = GridConnectDecoder::new();
        let decoded = decoder.push(line.as_bytes());
        assert_eq!(decoded, vec![frame]);
    }

    #[test]
    fn round_trips_empty_data_frame() {
        let frame = CanFrame::new(0x19490365, vec![]).unwrap();
        let line = encode(&frame);
        assert_eq!(line, ":X19490365N;\n");
        let mut decoder = GridConnectDecoder::new();
        assert_eq!(decoder.push(line.as_bytes()), vec![frame]);
    }

    #[test]
    fn handles_split_across_two_pushes() {
        let frame = CanFrame::new(0x19170365, vec![0xAB]).unwrap();
        let line = encode(&frame);
        let mid = line.len() / 2;
        let mut decoder = GridConnectDecoder::new();
        assert!(decoder.push(line.as_bytes()[..mid].as_ref()).is_empty());
        let decoded = decoder.push(line.as_bytes()[mid..].as_ref());
        assert_eq!(decoded, vec![frame]);
    }

    #[test]
    fn skips_malformed_line_and_continues() {
        let good = CanFrame::new(0x19490365, vec![]).unwrap();
        let mut decoder = GridConnectDecoder::new();
        let input = format!(":XZZZZZZZZN;\n{}", encode(&good));
        let decoded = decoder.push(input.as_bytes());
        assert_eq!(decoded, vec![good]);
    }
}
