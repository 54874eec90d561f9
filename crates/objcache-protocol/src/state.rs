use crate::declaration::Declaration;
use crate::error::ProtocolResult;

/// Progress made by one [`ParseState::consume`] call.
#[derive(Debug, PartialEq, Eq)]
pub struct Step<O> {
    /// Bytes taken from the front of the buffer.
    pub consumed: usize,
    /// Set when the state finished what it was armed for.
    pub outcome: Option<O>,
}

impl<O> Step<O> {
    /// Nothing could be interpreted; wait for more bytes.
    pub fn pending() -> Self {
        Self {
            consumed: 0,
            outcome: None,
        }
    }

    /// Consumed `consumed` bytes without finishing.
    pub fn progress(consumed: usize) -> Self {
        Self {
            consumed,
            outcome: None,
        }
    }

    /// Consumed `consumed` bytes and finished with `outcome`.
    pub fn done(consumed: usize, outcome: O) -> Self {
        Self {
            consumed,
            outcome: Some(outcome),
        }
    }
}

/// One mutually exclusive state of the batch decoder.
///
/// A state never consumes bytes it cannot fully interpret, so the caller can
/// keep the unconsumed tail and retry once more bytes arrive.
pub trait ParseState {
    /// What the state yields when it finishes.
    type Output;

    /// Human-readable state name, used in errors and logs.
    fn name(&self) -> &'static str;

    /// Arm the state for a freshly declared object.
    fn reset(&mut self, declaration: &Declaration);

    /// Make as much progress on `buf` as possible.
    fn consume(&mut self, buf: &[u8]) -> ProtocolResult<Step<Self::Output>>;
}

/// Length of the optional newline that trails a payload, if it is buffered.
pub(crate) fn trailing_newline(rest: &[u8]) -> usize {
    usize::from(rest.first() == Some(&b'\n'))
}
