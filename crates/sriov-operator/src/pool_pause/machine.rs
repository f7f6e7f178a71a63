use sriov_api::MachineConfigPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PausePhase {
    #[default]
    WaitingForQuiesce,
    /// `spec.paused` is set and the node state says `MCP_Paused`.
    PauseRecorded,
    Confirmed,
}

/// What the coordinator has to do after one pool observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseAction {
    Wait,
    /// Pause the pool (unless `already_paused`) and record `MCP_Paused`.
    Pause { already_paused: bool },
    Confirm,
}

/// Progress of one pause acquisition, fed with every pool observation.
///
/// The machine only moves forward when the coordinator reports that an
/// action succeeded, so a failed patch leaves it where it was and the next
/// observation retries the same action.
#[derive(Debug, Clone, Default)]
pub struct PauseStateMachine {
    phase: PausePhase,
}

impl PauseStateMachine {
    pub fn phase(&self) -> PausePhase {
        self.phase
    }

    pub fn is_confirmed(&self) -> bool {
        self.phase == PausePhase::Confirmed
    }

    pub fn observe(&self, pool: &MachineConfigPool) -> PauseAction {
        match self.phase {
            PausePhase::Confirmed => PauseAction::Confirm,
            _ if !pool.is_quiesced() => PauseAction::Wait,
            PausePhase::WaitingForQuiesce => PauseAction::Pause {
                already_paused: pool.is_paused(),
            },
            PausePhase::PauseRecorded => PauseAction::Confirm,
        }
    }

    /// A pool that was paused before we got to it needs no second look.
    pub fn pause_recorded(&mut self, already_paused: bool) {
        self.phase = if already_paused {
            PausePhase::Confirmed
        } else {
            PausePhase::PauseRecorded
        };
    }

    pub fn confirm(&mut self) {
        self.phase = PausePhase::Confirmed;
    }
}
