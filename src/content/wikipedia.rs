use super::*;
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Categories and titles the image filter looks at
const MEDIA_KEYWORDS: &[&str] = &[
    "film", "movie", "television", "tv series", "tv show", "tv program", "album",
    "discography", "single", "song", "soundtrack", "video game", "game", "book", "novel",
    "comic", "manga", "anime", "documentary", "magazine", "newspaper", "musical", "play",
    "theatre", "podcast", "radio program", "logo", "brand", "company",
];

static MEDIA_TITLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\(\d{4}\s+(film|album|song|series|game)\)|\((film|album|song|tv series)\)")
        .ok()
});

const MAX_CATEGORIES: usize = 5;
/// Articles per room or wiki_what round: one answer, three wrong options
const ARTICLES_PER_QUESTION: usize = 4;

/// Live articles from the public Wikipedia APIs
pub struct WikipediaProvider {
    api_base: String,
    action_api: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl WikipediaProvider {
    pub fn new(api_base: String, action_api: String, timeout: Duration) -> ContentResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("wikiguess/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ContentError::Invalid(format!("HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            action_api,
            client,
            timeout,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> ContentResult<T> {
        let response = tokio::time::timeout(
            self.timeout,
            self.client.get(url).query(query).send(),
        )
        .await
        .map_err(|_| ContentError::Timeout(self.timeout))?
        .map_err(|e| ContentError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ContentError::Transient(format!(
                "Wikipedia returned status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ContentError::Invalid(e.to_string()))
    }

    async fn random_titles(&self, count: usize) -> ContentResult<Vec<String>> {
        let listing: RandomListing = self
            .get_json(
                &self.action_api,
                &[
                    ("action", "query".to_string()),
                    ("list", "random".to_string()),
                    ("rnnamespace", "0".to_string()),
                    ("rnlimit", count.to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;

        Ok(listing.query.random.into_iter().map(|p| p.title).collect())
    }

    async fn categories(&self, title: &str) -> Vec<String> {
        let result: ContentResult<CategoryListing> = self
            .get_json(
                &self.action_api,
                &[
                    ("action", "query".to_string()),
                    ("titles", title.to_string()),
                    ("prop", "categories".to_string()),
                    ("cllimit", "10".to_string()),
                    ("clshow", "!hidden".to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await;

        match result {
            Ok(listing) => listing
                .query
                .pages
                .into_values()
                .flat_map(|page| page.categories)
                .map(|c| c.title.trim_start_matches("Category:").to_string())
                .collect(),
            Err(e) => {
                tracing::debug!("No categories for {:?}: {}", title, e);
                Vec::new()
            }
        }
    }

    /// Summary for one article, or `None` if it is unusable as a question
    async fn article(&self, title: &str) -> Option<WikiTopic> {
        let url = match summary_url(&self.api_base, title) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping article {:?}: {}", title, e);
                return None;
            }
        };
        let summary: PageSummary = match self.get_json(url.as_str(), &[]).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::debug!("Skipping article {:?}: {}", title, e);
                return None;
            }
        };

        if summary.kind.as_deref() == Some("disambiguation")
            || summary.title.starts_with("List of")
        {
            return None;
        }

        let categories = self.categories(&summary.title).await;
        let media = is_media_article(
            &categories,
            &summary.title,
            summary.description.as_deref().unwrap_or_default(),
        );
        let image_url = if media {
            None
        } else {
            summary
                .thumbnail
                .or(summary.originalimage)
                .map(|image| image.source)
        };

        Some(WikiTopic {
            id: summary
                .pageid
                .map(|id| id.to_string())
                .unwrap_or_else(|| summary.title.clone()),
            page_url: summary
                .content_urls
                .map(|urls| urls.desktop.page)
                .unwrap_or_else(|| format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_"))),
            title: summary.title,
            excerpt: summary.extract.unwrap_or_default(),
            image_url,
            categories: categories.into_iter().take(MAX_CATEGORIES).collect(),
        })
    }
}

/// Whether an article's image is likely to show its title (posters, covers, logos)
pub fn is_media_article(categories: &[String], title: &str, description: &str) -> bool {
    let categories = categories.join(" ").to_lowercase();
    let description = description.to_lowercase();

    if MEDIA_KEYWORDS
        .iter()
        .any(|k| categories.contains(k) || description.contains(k))
    {
        return true;
    }

    MEDIA_TITLE
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(title))
}

#[derive(Debug, Deserialize)]
struct RandomListing {
    query: RandomQuery,
}

#[derive(Debug, Deserialize)]
struct RandomQuery {
    random: Vec<RandomPage>,
}

#[derive(Debug, Deserialize)]
struct RandomPage {
    title: String,
}

#[derive(Debug, Deserialize)]
struct CategoryListing {
    query: CategoryQuery,
}

#[derive(Debug, Deserialize)]
struct CategoryQuery {
    #[serde(default)]
    pages: HashMap<String, CategoryPage>,
}

#[derive(Debug, Deserialize)]
struct CategoryPage {
    #[serde(default)]
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: String,
    pageid: Option<u64>,
    extract: Option<String>,
    description: Option<String>,
    thumbnail: Option<Image>,
    originalimage: Option<Image>,
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct Image {
    source: String,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: PageUrl,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

#[async_trait]
impl ContentProvider for WikipediaProvider {
    async fn fetch_questions(
        &self,
        category: Category,
        count: usize,
    ) -> ContentResult<Vec<QuestionRecord>> {
        if category != Category::WikiWhat {
            return Err(ContentError::InsufficientSupply {
                requested: count,
                available: 0,
            });
        }

        let articles = self
            .fetch_random_articles(count * ARTICLES_PER_QUESTION)
            .await?;
        let (with_excerpt, without): (Vec<_>, Vec<_>) =
            articles.into_iter().partition(|a| !a.excerpt.is_empty());

        // Surplus answer candidates double as wrong options
        let mut with_excerpt = with_excerpt.into_iter();
        let correct: Vec<WikiTopic> = with_excerpt.by_ref().take(count).collect();
        let mut wrong_titles: Vec<String> =
            with_excerpt.chain(without).map(|a| a.title).collect();

        if correct.len() < count || wrong_titles.len() < count {
            return Err(ContentError::InsufficientSupply {
                requested: count,
                available: correct.len().min(wrong_titles.len()),
            });
        }

        let per_question = (wrong_titles.len() / count).min(ARTICLES_PER_QUESTION - 1);
        Ok(correct
            .into_iter()
            .map(|topic| {
                let wrong_options = wrong_titles.drain(..per_question).collect();
                QuestionRecord {
                    id: format!("wiki:{}", topic.id),
                    data: QuestionData::WikiWhat {
                        topic,
                        wrong_options,
                    },
                }
            })
            .collect())
    }

    async fn fetch_random_articles(&self, count: usize) -> ContentResult<Vec<WikiTopic>> {
        // Some titles get filtered out, so ask for more than needed
        let titles = self.random_titles(count + count / 2 + 1).await?;
        let mut articles: Vec<WikiTopic> =
            join_all(titles.iter().map(|title| self.article(title)))
                .await
                .into_iter()
                .flatten()
                .collect();

        tracing::debug!(
            "Fetched {} usable articles out of {} random titles",
            articles.len(),
            titles.len()
        );

        if articles.len() < count {
            return Err(ContentError::InsufficientSupply {
                requested: count,
                available: articles.len(),
            });
        }
        articles.truncate(count);
        Ok(articles)
    }

    fn name(&self) -> &str {
        "wikipedia"
    }
}

/// REST summary endpoint for a title, with the title as one escaped path
/// segment so `/` or `?` in it stay part of the name
fn summary_url(api_base: &str, title: &str) -> ContentResult<reqwest::Url> {
    let mut url =
        reqwest::Url::parse(api_base).map_err(|e| ContentError::Invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ContentError::Invalid(format!("Not a base URL: {}", api_base)))?
        .pop_if_empty()
        .extend(["page", "summary", title.replace(' ', "_").as_str()]);
    Ok(url)
}
