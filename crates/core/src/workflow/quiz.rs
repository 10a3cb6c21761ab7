use serde::{Deserialize, Serialize};

use crate::domain::template::{QuestionId, QuizQuestion};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub question_id: QuestionId,
    pub selected_option: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub score_pct: u32,
    pub passed: bool,
    pub correct: u32,
    pub total: u32,
}

/// Score an answer set against the question bank. Unanswered questions and
/// out-of-range selections count as wrong; the score is the integer percent
/// of correct answers, rounded down.
pub fn evaluate(
    bank: &[QuizQuestion],
    passing_score_pct: u32,
    answers: &[QuizAnswer],
) -> QuizOutcome {
    let total = bank.len() as u32;
    if total == 0 {
        return QuizOutcome { score_pct: 0, passed: false, correct: 0, total: 0 };
    }

    let correct = bank
        .iter()
        .filter(|question| {
            answers
                .iter()
                .find(|answer| answer.question_id == question.id)
                .is_some_and(|answer| answer.selected_option == question.correct_option)
        })
        .count() as u32;

    let score_pct = correct * 100 / total;
    QuizOutcome { score_pct, passed: score_pct >= passing_score_pct, correct, total }
}
