/// Failed execution attempts (engine errors and human rejections) allowed
/// before the router stops retrying and finalizes.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_MAX_STEPS: usize = 50;

#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    pub max_retries: u32,
    /// Suspend before every `execute_sql` until a human approves or rejects.
    pub require_approval: bool,
    /// Upper bound on node executions per `run`/`resume` call.
    pub max_steps: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            require_approval: false,
            max_steps: Some(DEFAULT_MAX_STEPS),
        }
    }
}

/// Node executions of a run whose every attempt fails: the schema fetch, a
/// generate/execute pair per attempt, then the final answer.
pub fn min_steps_for(max_retries: u32) -> usize {
    2 * max_retries as usize + 2
}

impl ExecutionConfig {
    pub fn with_approval(mut self, require_approval: bool) -> Self {
        self.require_approval = require_approval;
        self
    }

    /// Also raises `max_steps` when it is too low for the new ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        if let Some(max_steps) = self.max_steps {
            self.max_steps = Some(max_steps.max(min_steps_for(max_retries)));
        }
        self
    }

    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// A step limit below [`min_steps_for`] would abort runs that are still
    /// owed a final answer.
    pub fn validate(&self) -> Result<(), String> {
        match self.max_steps {
            Some(max_steps) if max_steps < min_steps_for(self.max_retries) => Err(format!(
                "max_steps {max_steps} is too low for max_retries {}, need at least {}",
                self.max_retries,
                min_steps_for(self.max_retries)
            )),
            _ => Ok(()),
        }
    }
}
