//! Decoder lifecycle state

/// Decoder state machine
///
/// `Uninitialized → Ready → (Ready ⇄ Decoding) → Stopped`. A stopped decoder may be
/// started again, which opens a fresh codec context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// No codec context has been opened yet
    #[default]
    Uninitialized,

    /// A codec context is open and waiting for packets
    Ready,

    /// A packet is being pushed through the codec
    Decoding,

    /// The codec context has been released
    Stopped,
}

impl DecoderState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &DecoderState) -> bool {
        use DecoderState::*;

        match (self, target) {
            (Uninitialized, Ready) => true,
            (Ready, Decoding) => true,
            (Decoding, Ready) => true,
            (Ready, Stopped) | (Decoding, Stopped) => true,
            // restart after an explicit stop
            (Stopped, Ready) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            DecoderState::Uninitialized => "Uninitialized",
            DecoderState::Ready => "Ready",
            DecoderState::Decoding => "Decoding",
            DecoderState::Stopped => "Stopped",
        }
    }

    /// Check if a codec context is currently open
    pub fn is_open(&self) -> bool {
        matches!(self, DecoderState::Ready | DecoderState::Decoding)
    }
}

impl std::fmt::Display for DecoderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use DecoderState::*;

        assert!(Uninitialized.can_transition_to(&Ready));
        assert!(Ready.can_transition_to(&Decoding));
        assert!(Decoding.can_transition_to(&Ready));
        assert!(Ready.can_transition_to(&Stopped));
        assert!(Decoding.can_transition_to(&Stopped));
        assert!(Stopped.can_transition_to(&Ready));
        assert!(Ready.can_transition_to(&Ready));
    }

    #[test]
    fn test_invalid_transitions() {
        use DecoderState::*;

        assert!(!Uninitialized.can_transition_to(&Decoding));
        assert!(!Uninitialized.can_transition_to(&Stopped));
        assert!(!Stopped.can_transition_to(&Decoding));
        assert!(!Ready.can_transition_to(&Uninitialized));
    }

    #[test]
    fn test_state_checks() {
        assert!(!DecoderState::Uninitialized.is_open());
        assert!(DecoderState::Ready.is_open());
        assert!(DecoderState::Decoding.is_open());
        assert!(!DecoderState::Stopped.is_open());
        assert_eq!(DecoderState::default(), DecoderState::Uninitialized);
        assert_eq!(DecoderState::Decoding.to_string(), "Decoding");
    }
}
