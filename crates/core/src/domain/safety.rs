use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    Safe,
    Unsafe,
    /// The classifier answered, but not in a shape we could read.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub verdict: SafetyVerdict,
    #[serde(default)]
    pub unsafe_categories: Vec<String>,
}

impl SafetyAssessment {
    pub fn safe() -> Self {
        Self { verdict: SafetyVerdict::Safe, unsafe_categories: Vec::new() }
    }

    pub fn unsafe_with(categories: Vec<String>) -> Self {
        Self { verdict: SafetyVerdict::Unsafe, unsafe_categories: categories }
    }

    pub fn unreadable() -> Self {
        Self { verdict: SafetyVerdict::Error, unsafe_categories: Vec::new() }
    }

    pub fn is_unsafe(&self) -> bool {
        self.verdict == SafetyVerdict::Unsafe
    }

    pub fn flagged_message(&self) -> String {
        format!(
            "This conversation was flagged for unsafe content: {}",
            self.unsafe_categories.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{SafetyAssessment, SafetyVerdict};

    #[test]
    fn flagged_message_joins_categories() {
        let assessment = SafetyAssessment::unsafe_with(vec![
            "Violent Crimes".to_string(),
            "Hate".to_string(),
        ]);
        assert!(assessment.is_unsafe());
        assert_eq!(
            assessment.flagged_message(),
            "This conversation was flagged for unsafe content: Violent Crimes, Hate"
        );
    }

    #[test]
    fn unreadable_output_is_not_unsafe() {
        let assessment = SafetyAssessment::unreadable();
        assert_eq!(assessment.verdict, SafetyVerdict::Error);
        assert!(!assessment.is_unsafe());
    }
}
