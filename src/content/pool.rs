use super::*;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::path::Path;

const BUILTIN_QUESTIONS: &str = include_str!("../../data/questions.json");

/// Curated, in-memory question set
#[derive(Debug, Clone, Default)]
pub struct QuestionPool {
    questions: HashMap<Category, Vec<QuestionRecord>>,
    /// Extra titles usable as wrong options for article-based rounds
    distractor_titles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PoolDocument {
    #[serde(default)]
    distractor_titles: Vec<String>,
    questions: Vec<QuestionRecord>,
}

impl QuestionPool {
    pub fn new(records: Vec<QuestionRecord>, distractor_titles: Vec<String>) -> Self {
        let mut questions: HashMap<Category, Vec<QuestionRecord>> = HashMap::new();
        for record in records {
            questions.entry(record.category()).or_default().push(record);
        }
        Self {
            questions,
            distractor_titles,
        }
    }

    /// Parse a pool document: `{"distractor_titles": [...], "questions": [...]}`
    pub fn from_json(json: &str) -> ContentResult<Self> {
        let doc: PoolDocument =
            serde_json::from_str(json).map_err(|e| ContentError::Invalid(e.to_string()))?;

        let mut ids = HashSet::new();
        if let Some(dup) = doc.questions.iter().find(|q| !ids.insert(q.id.as_str())) {
            return Err(ContentError::Invalid(format!(
                "duplicate question id {}",
                dup.id
            )));
        }

        Ok(Self::new(doc.questions, doc.distractor_titles))
    }

    pub fn load(path: impl AsRef<Path>) -> ContentResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ContentError::Invalid(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let pool = Self::from_json(&json)?;
        tracing::info!(
            "Loaded {} questions from {}",
            pool.total(),
            path.display()
        );
        Ok(pool)
    }

    /// The question set shipped with the crate
    pub fn builtin() -> ContentResult<Self> {
        Self::from_json(BUILTIN_QUESTIONS)
    }

    pub fn count(&self, category: Category) -> usize {
        self.questions.get(&category).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.questions.values().map(Vec::len).sum()
    }

    /// Topics from `wiki_what` records, with excerpts
    fn full_topics(&self) -> Vec<WikiTopic> {
        self.questions
            .get(&Category::WikiWhat)
            .into_iter()
            .flatten()
            .filter_map(|record| match &record.data {
                QuestionData::WikiWhat { topic, .. } => Some(topic.clone()),
                _ => None,
            })
            .collect()
    }

    /// Titles that only ever appear as wrong options
    fn bare_titles(&self, exclude: &HashSet<String>) -> Vec<String> {
        let wrong_options = self
            .questions
            .get(&Category::WikiWhat)
            .into_iter()
            .flatten()
            .flat_map(|record| match &record.data {
                QuestionData::WikiWhat { wrong_options, .. } => wrong_options.clone(),
                _ => Vec::new(),
            });

        let mut seen = exclude.clone();
        self.distractor_titles
            .iter()
            .cloned()
            .chain(wrong_options)
            .filter(|title| seen.insert(title.clone()))
            .collect()
    }
}

fn title_only_topic(title: String) -> WikiTopic {
    WikiTopic {
        id: format!("title:{}", title),
        page_url: format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_")),
        title,
        excerpt: String::new(),
        image_url: None,
        categories: Vec::new(),
    }
}

#[async_trait]
impl ContentProvider for QuestionPool {
    async fn fetch_questions(
        &self,
        category: Category,
        count: usize,
    ) -> ContentResult<Vec<QuestionRecord>> {
        let available = self.count(category);
        if available < count {
            return Err(ContentError::InsufficientSupply {
                requested: count,
                available,
            });
        }

        let mut records = self.questions.get(&category).cloned().unwrap_or_default();
        records.shuffle(&mut rand::rng());
        records.truncate(count);
        Ok(records)
    }

    /// Full topics first (shuffled), then title-only entries to fill out
    /// wrong options
    async fn fetch_random_articles(&self, count: usize) -> ContentResult<Vec<WikiTopic>> {
        let mut full = self.full_topics();
        let taken: HashSet<String> = full.iter().map(|t| t.title.clone()).collect();
        let mut bare = self.bare_titles(&taken);

        {
            let mut rng = rand::rng();
            full.shuffle(&mut rng);
            bare.shuffle(&mut rng);
        }

        let available = full.len() + bare.len();
        if available < count {
            return Err(ContentError::InsufficientSupply {
                requested: count,
                available,
            });
        }

        Ok(full
            .into_iter()
            .chain(bare.into_iter().map(title_only_topic))
            .take(count)
            .collect())
    }

    fn name(&self) -> &str {
        "pool"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_pool_covers_every_category() {
        let pool = QuestionPool::builtin().unwrap();
        for category in Category::ALL {
            assert!(pool.count(category) >= 5, "{:?}", category);
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{
            "questions": [
                {"id": "a", "category": "wiki_or_fiction", "statement": "x", "is_true": true},
                {"id": "a", "category": "wiki_or_fiction", "statement": "y", "is_true": false}
            ]
        }"#;
        let err = QuestionPool::from_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate question id a"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"questions": [{{"id": "w1", "category": "when_in_wiki", "event": "e", "correct_year": 1900, "year_options": [1899, 1900]}}]}}"#
        )
        .unwrap();

        let pool = QuestionPool::load(file.path()).unwrap();
        assert_eq!(pool.count(Category::WhenInWiki), 1);
        assert_eq!(pool.total(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = QuestionPool::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ContentError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_fetch_questions_insufficient_supply() {
        let pool = QuestionPool::builtin().unwrap();
        let err = pool
            .fetch_questions(Category::WikiLinks, 100)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ContentError::InsufficientSupply {
                requested: 100,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fetch_questions_are_distinct() {
        let pool = QuestionPool::builtin().unwrap();
        let records = pool.fetch_questions(Category::OddWikiOut, 4).await.unwrap();
        let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn test_random_articles_lead_with_full_topics() {
        let pool = QuestionPool::builtin().unwrap();
        let articles = pool.fetch_random_articles(20).await.unwrap();
        assert_eq!(articles.len(), 20);

        let full = pool.count(Category::WikiWhat);
        assert!(articles[..full].iter().all(|a| !a.excerpt.is_empty()));
        assert!(articles[full..].iter().all(|a| a.excerpt.is_empty()));

        let titles: HashSet<_> = articles.iter().map(|a| a.title.clone()).collect();
        assert_eq!(titles.len(), 20);
    }
}
