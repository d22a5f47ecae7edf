//! Incremental sentence segmentation of streamed LLM output
//!
//! Converts an unbounded stream of text deltas into speakable sentence
//! units as early as possible, so synthesis can start while the model is
//! still generating. Splits at sentence-terminal punctuation, holds back
//! fragments too short to speak, and guarantees the emitted units (plus
//! any discarded tail) reconstruct the original stream modulo whitespace
//! trimming.

/// Characters that terminate a speakable sentence
const SENTENCE_TERMINALS: [char; 3] = ['.', '!', '?'];

/// Minimum trimmed length for a unit emitted mid-stream
const MIN_UNIT_CHARS: usize = 5;

/// Minimum trimmed length for the end-of-stream flush
const MIN_FLUSH_CHARS: usize = 3;

/// A span of generated text complete enough to synthesize independently
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentenceUnit {
    /// Trimmed sentence text
    pub text: String,

    /// Emission order within the turn, strictly increasing from 1
    pub sequence: u64,
}

/// Streaming sentence segmenter
///
/// Feed deltas as they arrive; call [`flush`](Self::flush) once the
/// stream ends to drain the remainder. One segmenter instance per turn.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    /// Text accumulated since the last emitted unit
    buffer: String,

    /// Full stream text, kept for the single-unit fallback
    original: String,

    /// Sequence number of the last emitted unit
    last_sequence: u64,
}

impl SentenceSegmenter {
    /// Create a new segmenter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text delta, returning any units that became complete
    pub fn feed(&mut self, delta: &str) -> Vec<SentenceUnit> {
        self.buffer.push_str(delta);
        self.original.push_str(delta);

        let mut units = Vec::new();

        // Scan for terminal markers; a candidate too short to speak stays
        // buffered and merges into the next sentence.
        let mut scan_from = 0;
        loop {
            let Some(rel) = self.buffer[scan_from..].find(SENTENCE_TERMINALS) else {
                break;
            };
            // Terminals are ASCII, so +1 lands on a char boundary
            let end = scan_from + rel + 1;
            let candidate = self.buffer[..end].trim();

            if candidate.chars().count() > MIN_UNIT_CHARS {
                self.last_sequence += 1;
                units.push(SentenceUnit {
                    text: candidate.to_string(),
                    sequence: self.last_sequence,
                });
                self.buffer.drain(..end);
                scan_from = 0;
            } else {
                scan_from = end;
            }
        }

        units
    }

    /// Flush the remaining buffer at end of stream
    ///
    /// Returns the final unit, or `None` when the tail is too short to
    /// speak. If no unit was emitted during the whole stream, the full
    /// original text is returned as a single fallback unit.
    pub fn flush(&mut self) -> Option<SentenceUnit> {
        if self.last_sequence == 0 {
            let fallback = self.original.trim();
            if fallback.is_empty() {
                return None;
            }
            self.last_sequence += 1;
            let unit = SentenceUnit {
                text: fallback.to_string(),
                sequence: self.last_sequence,
            };
            self.buffer.clear();
            return Some(unit);
        }

        let tail = std::mem::take(&mut self.buffer);
        let trimmed = tail.trim();
        if trimmed.chars().count() > MIN_FLUSH_CHARS {
            self.last_sequence += 1;
            return Some(SentenceUnit {
                text: trimmed.to_string(),
                sequence: self.last_sequence,
            });
        }

        if !trimmed.is_empty() {
            tracing::debug!(tail = %trimmed, "discarding short segment tail");
        }
        None
    }

    /// Number of units emitted so far
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.last_sequence
    }
}

/// Segment a complete response (non-streaming convenience)
#[must_use]
pub fn segment_response(text: &str) -> Vec<SentenceUnit> {
    let mut segmenter = SentenceSegmenter::new();
    let mut units = segmenter.feed(text);
    if let Some(tail) = segmenter.flush() {
        units.push(tail);
    }
    units
}
