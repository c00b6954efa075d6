//! Lessons, assessments, and capstone evaluation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EndstateError;
use crate::types::SkillNode;

// ── Lessons ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LessonSection {
    pub heading: String,
    pub body: String,
}

/// A generated lesson for one skill graph node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
    pub node_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub sections: Vec<LessonSection>,
    pub generated_at: DateTime<Utc>,
}

// ── Assessments ───────────────────────────────────────────────────

/// A multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub choices: Vec<String>,
    pub answer_index: usize,
    /// Concept this question probes, used to target remediation.
    #[serde(default)]
    pub concept: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assessment {
    pub node_id: String,
    pub questions: Vec<Question>,
    pub generated_at: DateTime<Utc>,
}

/// The learner's answers, one choice index per question, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSubmission {
    pub answers: Vec<usize>,
}

/// Per-question outcome of a graded submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradedQuestion {
    pub question_id: String,
    pub correct: bool,
    pub concept: Option<String>,
}

impl Assessment {
    /// Drop questions whose answer index is out of range.
    pub fn sanitized(mut self) -> Self {
        self.questions
            .retain(|q| !q.choices.is_empty() && q.answer_index < q.choices.len());
        self
    }

    /// Grade a submission. The number of answers must match the number of questions.
    pub fn grade(&self, submission: &AssessmentSubmission) -> Result<Vec<GradedQuestion>, EndstateError> {
        if submission.answers.len() != self.questions.len() {
            return Err(EndstateError::Validation(format!(
                "expected {} answers, got {}",
                self.questions.len(),
                submission.answers.len()
            )));
        }
        Ok(self
            .questions
            .iter()
            .zip(&submission.answers)
            .map(|(q, &answer)| GradedQuestion {
                question_id: q.id.clone(),
                correct: answer == q.answer_index,
                concept: q.concept.clone(),
            })
            .collect())
    }
}

/// Result of scoring an assessment submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessmentResult {
    pub node_id: String,
    /// Fraction correct, 0.0–1.0. Stored as the node's mastery.
    pub score: f64,
    pub correct: usize,
    pub total: usize,
    pub passed: bool,
    pub graded: Vec<GradedQuestion>,
    /// Remedial nodes inserted because the assessment was failed.
    #[serde(default)]
    pub remedial_nodes: Vec<SkillNode>,
}

/// Fraction of correct answers; an empty assessment scores 0.
pub fn score(graded: &[GradedQuestion]) -> f64 {
    if graded.is_empty() {
        return 0.0;
    }
    graded.iter().filter(|g| g.correct).count() as f64 / graded.len() as f64
}

// ── Capstone ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapstoneSubmission {
    pub title: String,
    #[serde(default)]
    pub repository_url: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RubricCriterion {
    pub name: String,
    pub weight: f64,
    pub description: String,
}

/// The fixed capstone rubric. Weights sum to 1.0.
pub fn capstone_rubric() -> Vec<RubricCriterion> {
    [
        (
            "Functionality",
            0.35,
            "The project works and delivers what was agreed.",
        ),
        (
            "Code Quality",
            0.25,
            "Structure, readability, error handling, and tests.",
        ),
        (
            "Concept Application",
            0.25,
            "Correct use of the skills and concepts from the learning plan.",
        ),
        (
            "Documentation",
            0.15,
            "README, usage instructions, and design notes.",
        ),
    ]
    .into_iter()
    .map(|(name, weight, description)| RubricCriterion {
        name: name.to_string(),
        weight,
        description: description.to_string(),
    })
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriterionScore {
    pub criterion: String,
    /// 0–10.
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapstoneEvaluation {
    pub scores: Vec<CriterionScore>,
    /// Weighted overall score, 0–10.
    pub overall: f64,
    pub passed: bool,
    #[serde(default)]
    pub summary: String,
}

impl CapstoneEvaluation {
    /// Combine per-criterion scores with the rubric weights.
    ///
    /// Scores are clamped to 0–10; criteria missing from `scores` count as 0.
    pub fn from_scores(
        mut scores: Vec<CriterionScore>,
        summary: String,
        pass_score: f64,
    ) -> Self {
        for s in &mut scores {
            s.score = s.score.clamp(0.0, 10.0);
        }
        let overall = capstone_rubric()
            .iter()
            .map(|c| {
                let score = scores
                    .iter()
                    .find(|s| s.criterion.eq_ignore_ascii_case(&c.name))
                    .map(|s| s.score)
                    .unwrap_or(0.0);
                score * c.weight
            })
            .sum::<f64>();
        let overall = (overall * 100.0).round() / 100.0;
        Self {
            scores,
            overall,
            passed: overall >= pass_score,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment() -> Assessment {
        Assessment {
            node_id: "n1".to_string(),
            questions: vec![
                Question {
                    id: "q1".to_string(),
                    prompt: "2 + 2?".to_string(),
                    choices: vec!["3".to_string(), "4".to_string()],
                    answer_index: 1,
                    concept: Some("Addition".to_string()),
                },
                Question {
                    id: "q2".to_string(),
                    prompt: "3 * 3?".to_string(),
                    choices: vec!["9".to_string(), "6".to_string()],
                    answer_index: 0,
                    concept: Some("Multiplication".to_string()),
                },
            ],
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn grade_and_score() {
        let graded = assessment()
            .grade(&AssessmentSubmission { answers: vec![1, 1] })
            .unwrap();
        assert!(graded[0].correct);
        assert!(!graded[1].correct);
        assert!((score(&graded) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn grade_rejects_wrong_answer_count() {
        let result = assessment().grade(&AssessmentSubmission { answers: vec![1] });
        assert!(matches!(result, Err(EndstateError::Validation(_))));
    }

    #[test]
    fn sanitized_drops_invalid_questions() {
        let mut a = assessment();
        a.questions[1].answer_index = 7;
        assert_eq!(a.sanitized().questions.len(), 1);
    }

    #[test]
    fn rubric_weights_sum_to_one() {
        let total: f64 = capstone_rubric().iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn capstone_weighted_overall() {
        let scores = vec![
            CriterionScore {
                criterion: "functionality".to_string(),
                score: 10.0,
                feedback: String::new(),
            },
            CriterionScore {
                criterion: "Code Quality".to_string(),
                score: 8.0,
                feedback: String::new(),
            },
            CriterionScore {
                criterion: "Concept Application".to_string(),
                score: 12.0, // clamped to 10
                feedback: String::new(),
            },
        ];
        let eval = CapstoneEvaluation::from_scores(scores, "ok".to_string(), 7.0);
        // 3.5 + 2.0 + 2.5 + 0 (documentation missing)
        assert!((eval.overall - 8.0).abs() < 1e-9);
        assert!(eval.passed);
        assert_eq!(eval.scores[2].score, 10.0);
    }
}
