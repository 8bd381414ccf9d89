//! Pulse-code Transcoder
//!
//! Turns statement text into the digit strings the side-channel display
//! hardware plays back. The code is International Morse with a digit alphabet:
//!
//! | Symbol | Meaning                                   |
//! |--------|-------------------------------------------|
//! | `0`    | short pulse (dot)                         |
//! | `1`    | long pulse (dash)                         |
//! | `2`    | gap after every encoded character         |
//! | `22`   | word gap (space pattern `2` + its gap)    |
//! | `3`    | sentence gap, only between sentences      |
//!
//! Text is split into sentences at `.`, `!` or `?` followed by whitespace and
//! each sentence is encoded independently. Characters without a pattern are
//! dropped, and a sentence without a single encodable glyph is left out of
//! the frame.
//!
//! Frames are addressed to a rotating display slot by [`PulseEmitter`].

use parking_lot::Mutex;

use crate::messages::PulseCodeMessage;

/// Short pulse
pub const DOT: char = '0';
/// Long pulse
pub const DASH: char = '1';
/// Gap appended after every encoded character
pub const CHAR_GAP: char = '2';
/// Gap placed between sentences of one frame
pub const SENTENCE_GAP: char = '3';

/// Pattern emitted for whitespace inside a sentence (followed by [`CHAR_GAP`])
const WORD_GAP_PATTERN: &str = "2";

/// Fixed pattern flashed by a client `Test` event
pub const TEST_PATTERN: &str = "0120123101";

/// Pulse pattern for a single character, case-insensitive
#[must_use]
pub fn pattern(c: char) -> Option<&'static str> {
    let pattern = match c.to_ascii_uppercase() {
        'A' => "01",
        'B' => "1000",
        'C' => "1010",
        'D' => "100",
        'E' => "0",
        'F' => "0010",
        'G' => "110",
        'H' => "0000",
        'I' => "00",
        'J' => "0111",
        'K' => "101",
        'L' => "0100",
        'M' => "11",
        'N' => "10",
        'O' => "111",
        'P' => "0110",
        'Q' => "1101",
        'R' => "010",
        'S' => "000",
        'T' => "1",
        'U' => "001",
        'V' => "0001",
        'W' => "011",
        'X' => "1001",
        'Y' => "1011",
        'Z' => "1100",
        '0' => "11111",
        '1' => "01111",
        '2' => "00111",
        '3' => "00011",
        '4' => "00001",
        '5' => "00000",
        '6' => "10000",
        '7' => "11000",
        '8' => "11100",
        '9' => "11110",
        '.' => "010101",
        ',' => "110011",
        '?' => "001100",
        '\'' => "011110",
        '!' => "101011",
        '/' => "10010",
        '(' => "10110",
        ')' => "101101",
        '&' => "01000",
        ':' => "111000",
        ';' => "101010",
        '=' => "10001",
        '+' => "01010",
        '-' => "100001",
        '_' => "001101",
        '"' => "010010",
        '$' => "0001001",
        '@' => "011010",
        c if c.is_whitespace() => WORD_GAP_PATTERN,
        _ => return None,
    };
    Some(pattern)
}

/// Split text into sentences
///
/// A sentence ends at `.`, `!` or `?` when the next character is whitespace;
/// the whitespace run after the terminator is consumed. Blank pieces are
/// skipped.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(next_i, next_c)) = chars.peek() else {
            break;
        };
        if !next_c.is_whitespace() {
            continue;
        }
        push_sentence(&mut sentences, &text[start..next_i]);
        // Consume the whitespace run so the next sentence starts on a glyph
        start = next_i;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            start = j + w.len_utf8();
            chars.next();
        }
    }
    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence<'a>(sentences: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        sentences.push(piece);
    }
}

/// Encode one sentence, appending [`CHAR_GAP`] after every known character
#[must_use]
pub fn encode_sentence(sentence: &str) -> String {
    let mut out = String::with_capacity(sentence.len() * 5);
    for c in sentence.chars() {
        if let Some(p) = pattern(c) {
            out.push_str(p);
            out.push(CHAR_GAP);
        }
    }
    out
}

/// A transcoded statement: one digit string per sentence
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PulseCode {
    sentences: Vec<String>,
}

impl PulseCode {
    /// Per-sentence digit strings
    #[must_use]
    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    /// Whether nothing encodable was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Sentences joined with [`SENTENCE_GAP`], as transmitted
    #[must_use]
    pub fn joined(&self) -> String {
        self.sentences.join(&SENTENCE_GAP.to_string())
    }
}

/// Transcode free text into a [`PulseCode`]
#[must_use]
pub fn transcode(text: &str) -> PulseCode {
    let sentences = split_sentences(text)
        .into_iter()
        .map(encode_sentence)
        .filter(|encoded| encoded.chars().any(|c| c == DOT || c == DASH))
        .collect();
    PulseCode { sentences }
}

/// Rotating display-slot counter
///
/// Yields `1, 2, .., window, 1, 2, ..`, advancing once per transmitted frame.
#[derive(Clone, Debug)]
pub struct SlotCounter {
    window: u32,
    sent: u64,
}

impl SlotCounter {
    /// Create a counter over `window` slots (a zero window is treated as 1)
    #[must_use]
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            sent: 0,
        }
    }

    /// Slot for the next frame; advances the counter
    pub fn advance(&mut self) -> u32 {
        // `sent % window` always fits back into u32
        let slot = u32::try_from(self.sent % u64::from(self.window)).unwrap_or(0) + 1;
        self.sent += 1;
        slot
    }

    /// Frames addressed so far
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

/// Builds side-channel frames with a rotating slot index
#[derive(Debug)]
pub struct PulseEmitter {
    group: u32,
    slots: Mutex<SlotCounter>,
}

impl PulseEmitter {
    /// Create an emitter for a display group and slot window
    #[must_use]
    pub fn new(group: u32, window: u32) -> Self {
        Self {
            group,
            slots: Mutex::new(SlotCounter::new(window)),
        }
    }

    /// Address a transcoded statement to the next display slot
    ///
    /// Returns `None` for empty codes so no slot is consumed.
    pub fn frame(&self, code: &PulseCode) -> Option<PulseCodeMessage> {
        if code.is_empty() {
            return None;
        }
        let (index, sent) = {
            let mut slots = self.slots.lock();
            (slots.advance(), slots.sent())
        };
        tracing::trace!(group = self.group, index, sent, "Pulse frame addressed");
        Some(PulseCodeMessage::new(self.group, index, code.joined()))
    }
}

/// Frame for a client-requested test flash
#[must_use]
pub fn test_frame(group: u32, index: u32) -> PulseCodeMessage {
    PulseCodeMessage::new(group, index, TEST_PATTERN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sos() {
        let code = transcode("SOS");
        assert_eq!(code.sentences(), &["000211120002".to_string()]);
        // Deterministic across calls
        assert_eq!(transcode("SOS"), code);
        assert_eq!(transcode("sos"), code);
    }

    #[test]
    fn test_word_gap() {
        // E, word gap, T
        assert_eq!(encode_sentence("E T"), "022212");
    }

    #[test]
    fn test_unknown_characters_dropped() {
        assert_eq!(encode_sentence("E#T"), "0212");
        assert_eq!(encode_sentence("기후"), "");
        assert!(transcode("기후 위기").is_empty());
    }

    #[test]
    fn test_sentence_split() {
        assert_eq!(
            split_sentences("Hi. How are you?  Fine!"),
            vec!["Hi.", "How are you?", "Fine!"]
        );
        // No whitespace after the dot: same sentence
        assert_eq!(split_sentences("v1.2 is out."), vec!["v1.2 is out."]);
        assert_eq!(split_sentences("Wait...\nwhat"), vec!["Wait...", "what"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_joined_uses_sentence_gap() {
        let code = transcode("E. T");
        assert_eq!(code.sentences(), &["020101012".to_string(), "12".to_string()]);
        assert_eq!(code.joined(), "020101012312");
    }

    #[test]
    fn test_slot_counter_rotates() {
        let mut slots = SlotCounter::new(5);
        let seen: Vec<u32> = (0..12).map(|_| slots.advance()).collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 1, 2, 3, 4, 5, 1, 2]);
        assert_eq!(slots.sent(), 12);
    }

    #[test]
    fn test_zero_window_is_single_slot() {
        let mut slots = SlotCounter::new(0);
        assert_eq!(slots.advance(), 1);
        assert_eq!(slots.advance(), 1);
    }

    #[test]
    fn test_emitter_frames() {
        let emitter = PulseEmitter::new(100, 2);
        let code = transcode("SOS");
        let first = emitter.frame(&code).unwrap();
        let second = emitter.frame(&code).unwrap();
        let third = emitter.frame(&code).unwrap();
        assert_eq!((first.index, second.index, third.index), (1, 2, 1));
        assert_eq!(first.group, 100);
        assert_eq!(first.kind, "PulseCode");
        assert_eq!(first.value, "000211120002");
        // Empty codes do not consume a slot
        assert!(emitter.frame(&PulseCode::default()).is_none());
        assert_eq!(emitter.frame(&code).unwrap().index, 2);
    }

    #[test]
    fn test_test_frame() {
        let frame = test_frame(1, 1);
        assert_eq!(frame.value, TEST_PATTERN);
    }
}
