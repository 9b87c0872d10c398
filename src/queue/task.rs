/// Tasks that can be enqueued for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    EvaluateCoverage { feature_id: i64 },
}

impl Task {
    pub fn feature_id(&self) -> i64 {
        match self {
            Task::EvaluateCoverage { feature_id } => *feature_id,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Task::EvaluateCoverage { feature_id } => {
                format!("Evaluate WPT coverage of feature {feature_id}")
            }
        }
    }
}
