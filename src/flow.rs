// ABOUTME: Flow controller deciding which mutation steps a run executes
// ABOUTME: Update and insert branches are decided independently and always converge

/// Decision for a single mutation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    Execute,
    Skip,
}

impl StepDecision {
    pub fn is_execute(&self) -> bool {
        matches!(self, StepDecision::Execute)
    }
}

/// The branch plan for one run: which of the two mutation steps execute.
///
/// The two decisions are independent. Skipping the update never
/// short-circuits the insert - both branches converge before the run
/// finishes, so the insert always gets a chance to execute when it has
/// data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowPlan {
    pub update: StepDecision,
    pub insert: StepDecision,
}

impl FlowPlan {
    /// Build the plan from the rendered payloads.
    ///
    /// The update branch executes iff the rendered key list is non-empty;
    /// the insert branch executes iff the rendered insert payload is not
    /// the empty marker.
    pub fn from_rendered(update_keys: &str, insert_payload: Option<&str>) -> Self {
        Self {
            update: if update_keys.is_empty() {
                StepDecision::Skip
            } else {
                StepDecision::Execute
            },
            insert: if insert_payload.is_none() {
                StepDecision::Skip
            } else {
                StepDecision::Execute
            },
        }
    }

    /// Whether the run mutates the warehouse at all.
    pub fn is_noop(&self) -> bool {
        !self.update.is_execute() && !self.insert.is_execute()
    }
}
