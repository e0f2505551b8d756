use std::fmt;

/// Verdict for the released → modified transition of one dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Unchanged,
    Regression,
    Improvement,
    UnchangedFail,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Unchanged,
        Outcome::Regression,
        Outcome::Improvement,
        Outcome::UnchangedFail,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Unchanged => "UNCHANGED",
            Outcome::Regression => "REGRESSION",
            Outcome::Improvement => "IMPROVEMENT",
            Outcome::UnchangedFail => "UNCHANGED-FAIL",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify from the released and modified pass flags. Baseline does not participate.
pub fn classify(released_passed: bool, modified_passed: bool) -> Outcome {
    match (released_passed, modified_passed) {
        (true, true) => Outcome::Unchanged,
        (true, false) => Outcome::Regression,
        (false, true) => Outcome::Improvement,
        (false, false) => Outcome::UnchangedFail,
    }
}
