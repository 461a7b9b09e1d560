//! Quiz structural validation.

use std::collections::HashSet;

use crate::artifact::Quiz;

pub const REPAIR_INSTRUCTIONS: &str = "\
A valid quiz is a JSON object with a non-empty \"questions\" array. Every \
question must have: a non-empty \"question\" string; an \"options\" array of \
at least 4 answer strings with no duplicates (comparison is \
case-insensitive); a \"correct_answer\" that matches one of the options \
verbatim; and a non-empty \"explanation\" of why that answer is correct.";

/// Check a quiz against the schema rules. Returns violations, empty = valid.
///
/// A question missing its text or its options gets that one violation and no
/// further checks — downstream checks would only echo the same defect.
pub fn validate(quiz: &Quiz) -> Vec<String> {
    let mut violations = Vec::new();

    if quiz.questions.is_empty() {
        violations.push("Quiz must contain at least one question".to_string());
        return violations;
    }

    for (i, q) in quiz.questions.iter().enumerate() {
        let n = i + 1;

        if q.question.trim().is_empty() {
            violations.push(format!("Question {n}: missing question text"));
            continue;
        }
        if q.options.is_empty() {
            violations.push(format!("Question {n}: missing options"));
            continue;
        }

        if q.options.len() < 4 {
            violations.push(format!(
                "Question {n}: Must have at least 4 options (has {})",
                q.options.len()
            ));
        }

        let mut seen = HashSet::new();
        for option in &q.options {
            if !seen.insert(option.trim().to_lowercase()) {
                violations.push(format!("Question {n}: duplicate option '{option}'"));
            }
        }

        if q.correct_answer.trim().is_empty() {
            violations.push(format!("Question {n}: missing correct_answer"));
        } else if !q.options.iter().any(|o| o == &q.correct_answer) {
            violations.push(format!(
                "Question {n}: correct_answer '{}' does not match any option verbatim",
                q.correct_answer
            ));
        }

        if q.explanation.trim().is_empty() {
            violations.push(format!("Question {n}: missing explanation"));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::QuizQuestion;

    fn question(text: &str, options: &[&str], correct: &str) -> QuizQuestion {
        QuizQuestion {
            question: text.to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_answer: correct.to_string(),
            explanation: "Because the source says so.".to_string(),
        }
    }

    #[test]
    fn well_formed_quiz_has_zero_violations() {
        let quiz = Quiz {
            questions: (0..4)
                .map(|i| {
                    question(
                        &format!("What is fact {i}?"),
                        &["Alpha", "Beta", "Gamma", "Delta"],
                        "Beta",
                    )
                })
                .collect(),
        };
        assert!(validate(&quiz).is_empty());
    }

    #[test]
    fn empty_quiz_is_flagged() {
        let quiz = Quiz { questions: vec![] };
        let violations = validate(&quiz);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("at least one question"));
    }

    #[test]
    fn three_options_yields_exactly_one_violation() {
        let quiz = Quiz {
            questions: vec![question("What is mitosis?", &["A", "B", "C"], "B")],
        };
        let violations = validate(&quiz);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("Must have at least 4 options (has 3)"));
    }

    #[test]
    fn duplicate_options_flagged_case_insensitively() {
        let quiz = Quiz {
            questions: vec![question("Q?", &["Alpha", "beta", "Beta", "Delta"], "Alpha")],
        };
        let violations = validate(&quiz);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("duplicate option"));
    }

    #[test]
    fn correct_answer_must_match_verbatim() {
        let quiz = Quiz {
            questions: vec![question("Q?", &["Alpha", "Beta", "Gamma", "Delta"], "alpha")],
        };
        let violations = validate(&quiz);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("does not match any option verbatim"));
    }

    #[test]
    fn missing_question_text_short_circuits() {
        // No options, no answer, no explanation either — but only the
        // missing-text violation should be reported.
        let q = QuizQuestion::default();
        let quiz = Quiz { questions: vec![q] };
        let violations = validate(&quiz);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("missing question text"));
    }

    #[test]
    fn missing_options_short_circuits_answer_checks() {
        let quiz = Quiz {
            questions: vec![QuizQuestion {
                question: "Q?".to_string(),
                options: vec![],
                correct_answer: "Alpha".to_string(),
                explanation: String::new(),
            }],
        };
        let violations = validate(&quiz);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("missing options"));
    }
}
