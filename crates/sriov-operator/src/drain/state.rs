use sriov_api::DrainIntent;
use sriov_api::DrainProgress;

/// What one reconcile of a node has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStep {
    /// Nothing requested, nothing in flight.
    Idle,
    /// Agent went back to idle; undo the drain side effects.
    Complete,
    /// Agent asks for a drain; needs a budget slot first.
    Admit,
    /// Slot held; cordon and evict.
    Drain,
    /// Drain finished, waiting for the agent to go back to idle.
    AwaitAgent,
    /// Legacy agents drain on their own.
    Ignore,
}

/// Transition table of the drain state machine.
pub fn next_step(intent: DrainIntent, progress: DrainProgress) -> DrainStep {
    use DrainIntent as I;
    use DrainProgress as P;

    match (intent, progress) {
        (I::Idle, P::Idle) => DrainStep::Idle,
        (I::Idle, P::McpPaused | P::Draining | P::Complete) => DrainStep::Complete,
        (I::DrainRequired, P::Idle) => DrainStep::Admit,
        (I::DrainRequired, P::McpPaused | P::Draining) => DrainStep::Drain,
        (I::DrainRequired, P::Complete) => DrainStep::AwaitAgent,
        (I::Draining, _) => DrainStep::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn transition_table() {
        let cases = [
            (DrainIntent::Idle, DrainProgress::Idle, DrainStep::Idle),
            (DrainIntent::Idle, DrainProgress::Complete, DrainStep::Complete),
            (DrainIntent::Idle, DrainProgress::McpPaused, DrainStep::Complete),
            (DrainIntent::Idle, DrainProgress::Draining, DrainStep::Complete),
            (DrainIntent::DrainRequired, DrainProgress::Idle, DrainStep::Admit),
            (DrainIntent::DrainRequired, DrainProgress::McpPaused, DrainStep::Drain),
            (DrainIntent::DrainRequired, DrainProgress::Draining, DrainStep::Drain),
            (DrainIntent::DrainRequired, DrainProgress::Complete, DrainStep::AwaitAgent),
            (DrainIntent::Draining, DrainProgress::Idle, DrainStep::Ignore),
            (DrainIntent::Draining, DrainProgress::Draining, DrainStep::Ignore),
        ];

        for (intent, progress, expected) in cases {
            assert_eq!(next_step(intent, progress), expected, "{intent} / {progress}");
        }
    }
}
