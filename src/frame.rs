//! Frame Parser (C5, §4.5).
//!
//! Per-connection, stateful. Carries 0-9 leftover octets across reads and
//! never backtracks: each 10-octet window is classified exactly once.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    ValidDigits([u8; 9]),
    Terminate,
    InvalidFrame,
}

const TERMINATE_FRAME: &[u8; 10] = b"terminate\n";

pub struct FrameParser {
    carry: [u8; 10],
    carry_len: u8,
}

impl FrameParser {
    pub fn new() -> Self {
        Self { carry: [0u8; 10], carry_len: 0 }
    }

    /// Feed newly-arrived bytes, invoking `on_event` for each frame
    /// recognized in arrival order. Returns `true` if parsing halted for
    /// this connection (an `InvalidFrame` or `Terminate` was seen) - the
    /// caller must stop feeding more bytes to this parser.
    pub fn feed(&mut self, input: &[u8], mut on_event: impl FnMut(FrameEvent)) -> bool {
        let mut pos = 0;

        if self.carry_len > 0 {
            let need = 10 - self.carry_len as usize;
            let take = need.min(input.len());
            self.carry[self.carry_len as usize..self.carry_len as usize + take]
                .copy_from_slice(&input[..take]);
            self.carry_len += take as u8;
            pos += take;

            if self.carry_len < 10 {
                return false;
            }
            self.carry_len = 0;
            let window = self.carry;
            if let Some(halted) = classify_and_emit(&window, &mut on_event) {
                return halted;
            }
        }

        while input.len() - pos >= 10 {
            let window: [u8; 10] = input[pos..pos + 10].try_into().expect("10-byte window");
            pos += 10;
            if let Some(halted) = classify_and_emit(&window, &mut on_event) {
                return halted;
            }
        }

        let remaining = input.len() - pos;
        if remaining > 0 {
            self.carry[..remaining].copy_from_slice(&input[pos..]);
        }
        self.carry_len = remaining as u8;
        false
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies one 10-octet window, emits its event, and returns whether
/// parsing should halt (`Some(true)` invalid, `Some(true)` terminate,
/// `None` to keep going after a valid digit line).
fn classify_and_emit(window: &[u8; 10], on_event: &mut impl FnMut(FrameEvent)) -> Option<bool> {
    if window[9] != b'\n' {
        on_event(FrameEvent::InvalidFrame);
        return Some(true);
    }

    if window[..9].iter().all(u8::is_ascii_digit) {
        let mut digits = [0u8; 9];
        digits.copy_from_slice(&window[..9]);
        on_event(FrameEvent::ValidDigits(digits));
        return None;
    }

    if window == TERMINATE_FRAME {
        on_event(FrameEvent::Terminate);
        return Some(true);
    }

    on_event(FrameEvent::InvalidFrame);
    Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut FrameParser, input: &[u8]) -> (Vec<FrameEvent>, bool) {
        let mut events = Vec::new();
        let halted = parser.feed(input, |e| events.push(e));
        (events, halted)
    }

    #[test]
    fn single_valid_line() {
        let mut parser = FrameParser::new();
        let (events, halted) = collect(&mut parser, b"000000001\n");
        assert_eq!(events, vec![FrameEvent::ValidDigits(*b"000000001")]);
        assert!(!halted);
    }

    #[test]
    fn terminate_line() {
        let mut parser = FrameParser::new();
        let (events, halted) = collect(&mut parser, b"terminate\n");
        assert_eq!(events, vec![FrameEvent::Terminate]);
        assert!(halted);
    }

    #[test]
    fn multiple_lines_in_one_read() {
        let mut parser = FrameParser::new();
        let (events, halted) = collect(&mut parser, b"000000000\n000000001\n000000000\n");
        assert_eq!(
            events,
            vec![
                FrameEvent::ValidDigits(*b"000000000"),
                FrameEvent::ValidDigits(*b"000000001"),
                FrameEvent::ValidDigits(*b"000000000"),
            ]
        );
        assert!(!halted);
    }

    #[test]
    fn split_across_reads_byte_by_byte() {
        let mut parser = FrameParser::new();
        let mut events = Vec::new();
        let mut halted = false;
        for &b in b"000000001\n".iter() {
            halted |= parser.feed(&[b], |e| events.push(e));
        }
        assert_eq!(events, vec![FrameEvent::ValidDigits(*b"000000001")]);
        assert!(!halted);
    }

    #[test]
    fn second_partial_frame_in_same_read_is_carried_correctly() {
        // Exercises design note (c): the source drops a second partial
        // frame in the same read. This parser must not.
        let mut parser = FrameParser::new();
        let (events, _) = collect(&mut parser, b"000000001\n00000000");
        assert_eq!(events, vec![FrameEvent::ValidDigits(*b"000000001")]);
        let (events2, _) = collect(&mut parser, b"2\n");
        assert_eq!(events2, vec![FrameEvent::ValidDigits(*b"000000002")]);
    }

    #[test]
    fn short_frame_then_eof_is_invalid_not_truncated_valid() {
        let mut parser = FrameParser::new();
        let (events, halted) = collect(&mut parser, b"12345\n");
        assert_eq!(events, vec![FrameEvent::InvalidFrame]);
        assert!(halted);
    }

    #[test]
    fn nine_digits_no_lf_then_disconnect_leaves_no_event() {
        let mut parser = FrameParser::new();
        let (events, halted) = collect(&mut parser, b"123456789");
        assert!(events.is_empty());
        assert!(!halted);
    }

    #[test]
    fn wrong_length_line_is_invalid() {
        let mut parser = FrameParser::new();
        let (events, halted) = collect(&mut parser, b"0000000001\n"); // 10 digits + LF = 11 bytes
        assert_eq!(events, vec![FrameEvent::InvalidFrame]);
        assert!(halted);
    }

    #[test]
    fn halts_after_first_invalid_frame() {
        let mut parser = FrameParser::new();
        let (events, halted) = collect(&mut parser, b"xxxxxxxxx\n000000001\n");
        assert_eq!(events, vec![FrameEvent::InvalidFrame]);
        assert!(halted);
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_segmentation_recognizes_every_frame(
            count in 1usize..50,
            split_seed in proptest::collection::vec(1usize..7, 0..200),
        ) {
            let mut values = Vec::with_capacity(count);
            let mut stream = Vec::with_capacity(count * 10);
            for i in 0..count {
                let v = i as u32;
                let line = format!("{v:09}\n");
                values.push(*b"000000000"); // placeholder, overwritten below
                let bytes = line.into_bytes();
                values[i].copy_from_slice(&bytes[..9]);
                stream.extend_from_slice(&bytes);
            }

            let mut parser = FrameParser::new();
            let mut events = Vec::new();
            let mut offset = 0;
            let mut seed_idx = 0;
            while offset < stream.len() {
                let chunk = if seed_idx < split_seed.len() {
                    split_seed[seed_idx].min(stream.len() - offset)
                } else {
                    stream.len() - offset
                };
                seed_idx += 1;
                let chunk = chunk.max(1);
                let halted = parser.feed(&stream[offset..offset + chunk], |e| events.push(e));
                offset += chunk;
                proptest::prop_assert!(!halted);
            }

            let expected: Vec<FrameEvent> = values.into_iter().map(FrameEvent::ValidDigits).collect();
            proptest::prop_assert_eq!(events, expected);
        }
    }
}
