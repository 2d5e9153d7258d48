/// Lifecycle operation a unit is driven through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Load,
    Start,
    Finalize,
    Reload,
    Stop,
}

/// Where a unit stands within one orchestration pass.
///
/// Transitions only move forward, one step at a time. A unit whose phase
/// failed keeps the last state it reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum_macros::Display)]
pub enum UnitState {
    Registered,
    Injected,
    Loaded,
    Started,
    Finalized,
    Stopped,
}

impl UnitState {
    /// The state reached by completing `phase`, if `phase` is the next step.
    pub fn advance(self, phase: Phase) -> Option<UnitState> {
        match (self, phase) {
            (UnitState::Injected, Phase::Load) => Some(UnitState::Loaded),
            (UnitState::Loaded, Phase::Start) => Some(UnitState::Started),
            (UnitState::Started, Phase::Finalize) => Some(UnitState::Finalized),
            (UnitState::Finalized, Phase::Stop) => Some(UnitState::Stopped),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_are_lowercase() {
        assert_eq!(Phase::Finalize.to_string(), "finalize");
        assert_eq!(Phase::Reload.to_string(), "reload");
    }

    #[test]
    fn states_advance_one_step_at_a_time() {
        assert_eq!(UnitState::Injected.advance(Phase::Load), Some(UnitState::Loaded));
        assert_eq!(UnitState::Loaded.advance(Phase::Start), Some(UnitState::Started));
        assert_eq!(UnitState::Injected.advance(Phase::Start), None);
        assert_eq!(UnitState::Registered.advance(Phase::Load), None);
        assert_eq!(UnitState::Started.advance(Phase::Stop), None);
    }
}
