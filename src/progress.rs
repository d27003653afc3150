//! Learner progress rules.
//!
//! Pure state transitions over `UserContentProgress`; handlers load the records,
//! call into here, then persist the result. Nothing in this module touches storage.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Assessment, AssessmentQuestion, LearningPath, LessonState, ProgressStatus, QuestionKind,
    RATING_MAX, RATING_MIN, Survey, SurveyAnswer, UserContentProgress,
};

#[derive(Error, Debug, PartialEq)]
pub enum ProgressError {
    #[error("This lesson is locked until the previous lessons are completed")]
    LessonLocked,

    #[error("Lesson not found in this learning path")]
    UnknownLesson,

    #[error("This content has already been completed")]
    AlreadyCompleted,

    #[error("All {max} attempts have been used")]
    AttemptsExhausted { max: i32 },

    #[error("A response has already been submitted")]
    AlreadySubmitted,

    #[error("Expected {expected} answers, got {got}")]
    AnswerCount { expected: usize, got: usize },

    #[error("Answer for question {question} is out of range")]
    AnswerOutOfRange { question: usize },

    #[error("Question {0} is required")]
    MissingRequired(Uuid),

    #[error("Question {0} does not belong to this survey")]
    UnknownQuestion(Uuid),

    #[error("Question {0} was answered more than once")]
    DuplicateAnswer(Uuid),

    #[error("Invalid answer for question {question}: {reason}")]
    InvalidAnswer { question: Uuid, reason: String },

    #[error("This action is not available for {0} content")]
    WrongContentType(&'static str),
}

/// Moves a `not_started` record to `in_progress`. Other states are left untouched.
pub fn start(progress: &mut UserContentProgress, now: DateTime<Utc>) -> bool {
    if progress.status != ProgressStatus::NotStarted {
        return false;
    }
    progress.status = ProgressStatus::InProgress;
    progress.started_at.get_or_insert(now);
    progress.updated_at = now;
    true
}

fn mark_completed(progress: &mut UserContentProgress, now: DateTime<Utc>) {
    progress.status = ProgressStatus::Completed;
    progress.progress_percent = 100;
    progress.started_at.get_or_insert(now);
    progress.completed_at = Some(now);
    progress.updated_at = now;
}

/// Completes a module record.
pub fn complete_module(
    progress: &mut UserContentProgress,
    now: DateTime<Utc>,
) -> Result<(), ProgressError> {
    if progress.status == ProgressStatus::Completed {
        return Ok(());
    }
    mark_completed(progress, now);
    Ok(())
}

/// Derives the completed/locked flags for every lesson of `path`. With
/// `enforce_order`, lesson `n` is locked while any lesson before it is incomplete;
/// a completed lesson is never reported as locked.
pub fn lesson_states(path: &LearningPath, completed: &[Uuid]) -> Vec<LessonState> {
    let done: HashSet<Uuid> = completed.iter().copied().collect();
    let mut all_previous_done = true;

    path.lessons
        .iter()
        .map(|lesson| {
            let is_done = done.contains(&lesson.id);
            let locked = path.enforce_order && !all_previous_done && !is_done;
            all_previous_done &= is_done;
            LessonState {
                lesson: lesson.clone(),
                completed: is_done,
                locked,
            }
        })
        .collect()
}

/// complete_lesson
///
/// Marks `lesson_id` done (idempotent) and recomputes `progress_percent`. The record
/// becomes `completed` once every lesson is done. Completed lesson ids that no longer
/// exist in the path are dropped. A completed record is never reopened, even when
/// the path gained lessons since.
pub fn complete_lesson(
    progress: &mut UserContentProgress,
    path: &LearningPath,
    lesson_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), ProgressError> {
    if progress.status == ProgressStatus::Completed {
        return Ok(());
    }

    let states = lesson_states(path, &progress.completed_lessons);
    let state = states
        .iter()
        .find(|s| s.lesson.id == lesson_id)
        .ok_or(ProgressError::UnknownLesson)?;

    if state.locked {
        return Err(ProgressError::LessonLocked);
    }
    if state.completed {
        return Ok(());
    }

    let mut completed: Vec<Uuid> = states
        .iter()
        .filter(|s| s.completed)
        .map(|s| s.lesson.id)
        .collect();
    completed.push(lesson_id);

    let total = path.lessons.len();
    progress.completed_lessons = completed;
    progress.started_at.get_or_insert(now);
    progress.updated_at = now;

    if progress.completed_lessons.len() >= total {
        mark_completed(progress, now);
    } else {
        progress.status = ProgressStatus::InProgress;
        progress.progress_percent = percent(progress.completed_lessons.len(), total);
    }
    Ok(())
}

fn percent(part: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as i32
}

/// Points earned on one assessment attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub earned: i32,
    pub total: i32,
    /// Rounded percentage, 0 for an assessment without points.
    pub percent: i32,
}

/// `answers[i]` is the selected option of `questions[i]` (questions ordered by
/// position). Every index must be in bounds.
pub fn score_answers(
    questions: &[AssessmentQuestion],
    answers: &[i32],
) -> Result<Score, ProgressError> {
    if questions.len() != answers.len() {
        return Err(ProgressError::AnswerCount {
            expected: questions.len(),
            got: answers.len(),
        });
    }

    let mut earned = 0;
    let mut total = 0;
    for (idx, (question, answer)) in questions.iter().zip(answers).enumerate() {
        if *answer < 0 || *answer as usize >= question.options.len() {
            return Err(ProgressError::AnswerOutOfRange { question: idx + 1 });
        }
        total += question.points;
        if *answer == question.correct_option {
            earned += question.points;
        }
    }

    let percent = if total == 0 {
        0
    } else {
        ((earned as f64 / total as f64) * 100.0).round() as i32
    };
    Ok(Score {
        earned,
        total,
        percent,
    })
}

/// Records one attempt on `progress`. A pass completes the record; a fail leaves it
/// `in_progress` while attempts remain, and `failed` once the last one is used.
/// The best score is kept. Returns whether the attempt passed.
pub fn apply_assessment_score(
    progress: &mut UserContentProgress,
    assessment: &Assessment,
    score: &Score,
    now: DateTime<Utc>,
) -> Result<bool, ProgressError> {
    check_can_attempt(progress, assessment)?;

    let passed = score.percent >= assessment.passing_score;
    progress.attempts += 1;
    progress.score = Some(progress.score.map_or(score.percent, |s| s.max(score.percent)));
    progress.started_at.get_or_insert(now);
    progress.updated_at = now;

    if passed {
        mark_completed(progress, now);
    } else if progress.attempts >= assessment.max_attempts {
        progress.status = ProgressStatus::Failed;
        progress.completed_at = Some(now);
    } else {
        progress.status = ProgressStatus::InProgress;
    }
    Ok(passed)
}

/// Rejects submissions on completed records or once `max_attempts` is reached.
pub fn check_can_attempt(
    progress: &UserContentProgress,
    assessment: &Assessment,
) -> Result<(), ProgressError> {
    if progress.status == ProgressStatus::Completed {
        return Err(ProgressError::AlreadyCompleted);
    }
    if progress.attempts >= assessment.max_attempts {
        return Err(ProgressError::AttemptsExhausted {
            max: assessment.max_attempts,
        });
    }
    Ok(())
}

/// Checks a submission against the survey tree: every answered question must exist
/// and be answered once, every required question must be answered, and each value
/// must fit the question kind. Returns the answers in survey order.
pub fn validate_survey_answers(
    survey: &Survey,
    answers: &[SurveyAnswer],
) -> Result<Vec<SurveyAnswer>, ProgressError> {
    let mut seen = HashSet::new();
    for answer in answers {
        if !seen.insert(answer.question_id) {
            return Err(ProgressError::DuplicateAnswer(answer.question_id));
        }
        if !survey.questions().any(|q| q.id == answer.question_id) {
            return Err(ProgressError::UnknownQuestion(answer.question_id));
        }
    }

    let mut ordered = Vec::with_capacity(answers.len());
    for question in survey.questions() {
        let answer = answers
            .iter()
            .find(|a| a.question_id == question.id)
            .filter(|a| !is_blank(&a.value));

        let Some(answer) = answer else {
            if question.required {
                return Err(ProgressError::MissingRequired(question.id));
            }
            continue;
        };

        let invalid = |reason: &str| ProgressError::InvalidAnswer {
            question: question.id,
            reason: reason.to_string(),
        };
        let option_count = question.options.len() as u64;

        match question.kind {
            QuestionKind::SingleChoice => {
                let idx = answer.value.as_u64().ok_or_else(|| invalid("expected an option index"))?;
                if idx >= option_count {
                    return Err(invalid("option index out of range"));
                }
            }
            QuestionKind::MultiChoice => {
                let picks = answer
                    .value
                    .as_array()
                    .ok_or_else(|| invalid("expected a list of option indexes"))?;
                let mut picked = HashSet::new();
                for pick in picks {
                    let idx = pick.as_u64().ok_or_else(|| invalid("expected an option index"))?;
                    if idx >= option_count {
                        return Err(invalid("option index out of range"));
                    }
                    if !picked.insert(idx) {
                        return Err(invalid("option selected twice"));
                    }
                }
            }
            QuestionKind::Text => {
                let text = answer.value.as_str().ok_or_else(|| invalid("expected text"))?;
                if text.len() > 5000 {
                    return Err(invalid("text answer is too long"));
                }
            }
            QuestionKind::Rating => {
                let rating = answer.value.as_i64().ok_or_else(|| invalid("expected a rating"))?;
                if !(RATING_MIN..=RATING_MAX).contains(&rating) {
                    return Err(invalid("rating must be between 1 and 5"));
                }
            }
        }
        ordered.push(answer.clone());
    }
    Ok(ordered)
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Marks a survey record completed after a response was accepted.
pub fn complete_survey(
    progress: &mut UserContentProgress,
    now: DateTime<Utc>,
) -> Result<(), ProgressError> {
    if progress.status == ProgressStatus::Completed {
        return Err(ProgressError::AlreadySubmitted);
    }
    mark_completed(progress, now);
    Ok(())
}
