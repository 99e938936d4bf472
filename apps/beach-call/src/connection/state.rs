use std::fmt;

/// Negotiation progress of one peer link.
///
/// ```text
/// New -> OfferSent -----------------> Connected -> Failed | Closed
/// New -> AnswerPending -------------> Connected
/// ```
/// `Connected` means both descriptions are applied. There is no path back
/// from `Connected` to an offer state: renegotiation is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    New,
    OfferSent,
    AnswerPending,
    Connected,
    Failed,
    Closed,
}

/// What a caller asks a handler to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateOffer,
    AcceptOffer,
    SendAnswer,
    ApplyAnswer,
    Fail,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} while {from}")]
pub struct IllegalTransition {
    pub from: NegotiationState,
    pub action: Action,
}

impl NegotiationState {
    pub fn transition(self, action: Action) -> Result<NegotiationState, IllegalTransition> {
        use Action::*;
        use NegotiationState::*;

        let next = match (self, action) {
            (New, CreateOffer) => OfferSent,
            (New, AcceptOffer) => AnswerPending,
            (AnswerPending, SendAnswer) => Connected,
            (OfferSent, ApplyAnswer) => Connected,
            (New | OfferSent | AnswerPending | Connected, Fail) => Failed,
            (_, Close) => Closed,
            (from, action) => return Err(IllegalTransition { from, action }),
        };
        Ok(next)
    }

    /// True once a remote description is in place, so candidates can be applied.
    pub fn has_remote_description(self) -> bool {
        matches!(self, NegotiationState::AnswerPending | NegotiationState::Connected)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationState::Failed | NegotiationState::Closed)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NegotiationState::New => "new",
            NegotiationState::OfferSent => "offer-sent",
            NegotiationState::AnswerPending => "answer-pending",
            NegotiationState::Connected => "connected",
            NegotiationState::Failed => "failed",
            NegotiationState::Closed => "closed",
        };
        f.write_str(label)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::CreateOffer => "create an offer",
            Action::AcceptOffer => "accept an offer",
            Action::SendAnswer => "send an answer",
            Action::ApplyAnswer => "apply an answer",
            Action::Fail => "fail",
            Action::Close => "close",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Action::*;
    use NegotiationState::*;

    #[test]
    fn caller_path() {
        let state = New.transition(CreateOffer).unwrap();
        assert_eq!(state, OfferSent);
        assert!(!state.has_remote_description());
        let state = state.transition(ApplyAnswer).unwrap();
        assert_eq!(state, Connected);
        assert!(state.has_remote_description());
    }

    #[test]
    fn callee_path() {
        let state = New.transition(AcceptOffer).unwrap();
        assert_eq!(state, AnswerPending);
        assert!(state.has_remote_description());
        assert_eq!(state.transition(SendAnswer).unwrap(), Connected);
    }

    #[test]
    fn answer_is_only_legal_after_offer() {
        for from in [New, AnswerPending, Connected, Failed, Closed] {
            let err = from.transition(ApplyAnswer).unwrap_err();
            assert_eq!(err, IllegalTransition { from, action: ApplyAnswer });
        }
    }

    #[test]
    fn no_renegotiation_from_connected() {
        assert!(Connected.transition(CreateOffer).is_err());
        assert!(Connected.transition(AcceptOffer).is_err());
    }

    #[test]
    fn terminal_states() {
        assert_eq!(Connected.transition(Fail).unwrap(), Failed);
        assert!(Failed.transition(Fail).is_err());
        assert_eq!(Failed.transition(Close).unwrap(), Closed);
        assert_eq!(Closed.transition(Close).unwrap(), Closed);
        assert!(Failed.is_terminal() && Closed.is_terminal());
    }

    #[test]
    fn error_message_names_state_and_action() {
        let err = New.transition(ApplyAnswer).unwrap_err();
        assert_eq!(err.to_string(), "cannot apply an answer while new");
    }
}
