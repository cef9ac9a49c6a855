pub mod pool;
pub mod wikipedia;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::{with_timeout, GameError, GameResult};
use crate::redact::present_topic;
use crate::types::{Category, Difficulty, QuestionData, QuestionRecord, Round, WikiTopic};

pub use pool::QuestionPool;
pub use wikipedia::WikipediaProvider;

/// Options shown for multi-choice rounds
pub const MAX_OPTIONS: usize = 4;
pub const TRUE_OPTION: &str = "TRUE";
pub const FALSE_OPTION: &str = "FALSE";

#[derive(Debug, Error)]
pub enum ContentError {
    /// The provider has fewer records than were asked for
    #[error("Insufficient supply: requested {requested}, available {available}")]
    InsufficientSupply { requested: usize, available: usize },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Network or upstream failure; the same request may succeed later
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Malformed record or document
    #[error("Invalid content: {0}")]
    Invalid(String),
}

pub type ContentResult<T> = Result<T, ContentError>;

/// Source of questions and articles for sessions and rooms
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Return `count` distinct records of one category, or
    /// [`ContentError::InsufficientSupply`] if that many are not available
    async fn fetch_questions(
        &self,
        category: Category,
        count: usize,
    ) -> ContentResult<Vec<QuestionRecord>>;

    /// Random articles, used as room question topics and wrong options
    async fn fetch_random_articles(&self, count: usize) -> ContentResult<Vec<WikiTopic>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Tries the primary provider under a deadline, then the fallback
pub struct FallbackProvider {
    primary: Arc<dyn ContentProvider>,
    fallback: Arc<dyn ContentProvider>,
    timeout: Duration,
}

impl FallbackProvider {
    pub fn new(
        primary: Arc<dyn ContentProvider>,
        fallback: Arc<dyn ContentProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            timeout,
        }
    }
}

#[async_trait]
impl ContentProvider for FallbackProvider {
    async fn fetch_questions(
        &self,
        category: Category,
        count: usize,
    ) -> ContentResult<Vec<QuestionRecord>> {
        let primary = tokio::time::timeout(
            self.timeout,
            self.primary.fetch_questions(category, count),
        )
        .await
        .map_err(|_| ContentError::Timeout(self.timeout))
        .and_then(|result| result);

        match primary {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(
                    "{} could not supply {:?} questions ({}), using {}",
                    self.primary.name(),
                    category,
                    e,
                    self.fallback.name()
                );
                self.fallback.fetch_questions(category, count).await
            }
        }
    }

    async fn fetch_random_articles(&self, count: usize) -> ContentResult<Vec<WikiTopic>> {
        let primary =
            tokio::time::timeout(self.timeout, self.primary.fetch_random_articles(count))
                .await
                .map_err(|_| ContentError::Timeout(self.timeout))
                .and_then(|result| result);

        match primary {
            Ok(articles) => Ok(articles),
            Err(e) => {
                tracing::warn!(
                    "{} could not supply articles ({}), using {}",
                    self.primary.name(),
                    e,
                    self.fallback.name()
                );
                self.fallback.fetch_random_articles(count).await
            }
        }
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

// ========== Round composition ==========

/// Uniform, independent category draw per round
pub fn draw_categories<R: Rng + ?Sized>(total: usize, rng: &mut R) -> Vec<Category> {
    (0..total)
        .map(|_| Category::ALL[rng.random_range(0..Category::ALL.len())])
        .collect()
}

/// Build the full list of rounds for a session before play starts.
///
/// Each drawn category is requested once, for as many rounds as it was drawn.
/// Fails with [`GameError::ContentUnavailable`] if any category comes back
/// short, contains reused ids, or has records that cannot form valid options.
pub async fn compose_rounds<R: Rng + Send>(
    provider: &dyn ContentProvider,
    difficulty: Difficulty,
    total: usize,
    content_timeout: Duration,
    rng: &mut R,
) -> GameResult<Vec<Round>> {
    let categories = draw_categories(total, rng);

    let mut wanted: Vec<(Category, usize)> = Vec::new();
    for category in &categories {
        match wanted.iter_mut().find(|(c, _)| c == category) {
            Some((_, n)) => *n += 1,
            None => wanted.push((*category, 1)),
        }
    }

    let mut seen_ids = HashSet::new();
    let mut batches: HashMap<Category, Vec<QuestionRecord>> = HashMap::new();
    let mut usable_total = 0;

    for (category, count) in wanted {
        let records = with_timeout(
            content_timeout,
            "Question fetch",
            provider.fetch_questions(category, count),
        )
        .await?;

        let usable: Vec<QuestionRecord> = records
            .into_iter()
            .filter(|r| r.category() == category)
            .filter(|r| seen_ids.insert(r.id.clone()))
            .take(count)
            .collect();

        usable_total += usable.len();
        if usable.len() < count {
            tracing::warn!(
                "{} returned {} usable {:?} questions, needed {}",
                provider.name(),
                usable.len(),
                category,
                count
            );
            return Err(GameError::ContentUnavailable {
                needed: total,
                available: usable_total,
            });
        }
        batches.insert(category, usable);
    }

    let mut rounds = Vec::with_capacity(total);
    for (index, category) in categories.into_iter().enumerate() {
        let record = batches
            .get_mut(&category)
            .and_then(|records| records.pop())
            .ok_or(GameError::ContentUnavailable {
                needed: total,
                available: index,
            })?;

        match build_round(record, index as u32 + 1, difficulty, rng) {
            Ok(round) => rounds.push(round),
            Err(e) => {
                tracing::warn!("Rejecting question from {}: {}", provider.name(), e);
                return Err(GameError::ContentUnavailable {
                    needed: total,
                    available: index,
                });
            }
        }
    }

    Ok(rounds)
}

/// Turn one record into a playable round with its options laid out
pub fn build_round<R: Rng + ?Sized>(
    record: QuestionRecord,
    round_number: u32,
    difficulty: Difficulty,
    rng: &mut R,
) -> ContentResult<Round> {
    let category = record.category();

    let (options, correct_answer, topic) = match &record.data {
        QuestionData::WikiWhat {
            topic,
            wrong_options,
        } => {
            let options = build_options(&topic.title, wrong_options, rng)?;
            (
                options,
                topic.title.clone(),
                Some(present_topic(topic, difficulty)),
            )
        }
        QuestionData::OddWikiOut {
            items,
            impostor_index,
            ..
        } => {
            let impostor = items.get(*impostor_index).ok_or_else(|| {
                ContentError::Invalid(format!(
                    "{}: impostor index {} out of range",
                    record.id, impostor_index
                ))
            })?;
            (build_options(impostor, items, rng)?, impostor.clone(), None)
        }
        QuestionData::WhenInWiki {
            correct_year,
            year_options,
            ..
        } => {
            let years: Vec<String> = year_options.iter().map(i32::to_string).collect();
            let correct = correct_year.to_string();
            (build_options(&correct, &years, rng)?, correct, None)
        }
        QuestionData::WikiOrFiction { is_true, .. } => {
            let correct = if *is_true { TRUE_OPTION } else { FALSE_OPTION };
            (
                vec![TRUE_OPTION.to_string(), FALSE_OPTION.to_string()],
                correct.to_string(),
                None,
            )
        }
        QuestionData::WikiLinks {
            connection,
            connection_options,
            ..
        } => (
            build_options(connection, connection_options, rng)?,
            connection.clone(),
            None,
        ),
    };

    Ok(Round {
        round_number,
        category,
        question_id: record.id,
        data: record.data,
        topic,
        options,
        correct_answer,
        time_limit: difficulty.config().time_limit,
        started_at: None,
        ended_at: None,
        guess: None,
        is_correct: None,
        time_taken_ms: None,
        points_earned: None,
    })
}

/// Correct answer plus up to three distinct distractors, shuffled.
/// Candidates equal to the correct answer are skipped, so the correct answer
/// appears exactly once.
pub fn build_options<R: Rng + ?Sized>(
    correct: &str,
    candidates: &[String],
    rng: &mut R,
) -> ContentResult<Vec<String>> {
    let mut options = vec![correct.to_string()];
    for candidate in candidates {
        if options.len() >= MAX_OPTIONS {
            break;
        }
        if !options.iter().any(|o| o == candidate) {
            options.push(candidate.clone());
        }
    }

    if options.len() < 2 {
        return Err(ContentError::Invalid(format!(
            "no distractors for {:?}",
            correct
        )));
    }

    options.shuffle(rng);
    Ok(options)
}
