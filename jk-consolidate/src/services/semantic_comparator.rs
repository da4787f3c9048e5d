//! Semantic name comparison
//!
//! Arbitrates candidate pairs the alias rules cannot settle ("Ancho Chili" vs
//! "Ancho Chiles", "Scallion" vs "Green Onion"). Two implementations:
//! - [`HttpSemanticComparator`]: JSON POST to a classification endpoint
//! - [`HeuristicComparator`]: offline token-level check, used when no
//!   endpoint is configured
//!
//! Callers go through [`ResilientComparator`], which bounds each pair with a
//! timeout and a fixed number of attempts and turns every failure into a
//! "not similar, needs review" verdict. A pair is never merged on an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use super::similarity::{normalize_name, singularize_word};

const USER_AGENT: &str = concat!("jk-consolidate/", env!("CARGO_PKG_VERSION"));
const RATE_LIMIT_MS: u64 = 100;
const INITIAL_BACKOFF_MS: u64 = 250;

/// Comparator errors
#[derive(Debug, Error)]
pub enum ComparatorError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Comparator timed out after {0} ms")]
    Timeout(u64),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid API key")]
    InvalidApiKey,
}

impl ComparatorError {
    /// Network failures, timeouts, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ComparatorError::NetworkError(_) | ComparatorError::Timeout(_) => true,
            ComparatorError::ApiError(status, _) => *status == 429 || *status >= 500,
            ComparatorError::ParseError(_) | ComparatorError::InvalidApiKey => false,
        }
    }
}

/// Comparator answer for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticVerdict {
    pub similar: bool,
    /// 0.0 - 1.0
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
    /// Set when the verdict is a fail-closed fallback
    #[serde(default)]
    pub manual_review: bool,
}

impl SemanticVerdict {
    /// Fail-closed verdict used whenever the comparator cannot answer
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            similar: false,
            confidence: 0.0,
            reason: reason.into(),
            manual_review: true,
        }
    }

    /// Merge only when similar with enough confidence
    pub fn permits_merge(&self, min_confidence: f64) -> bool {
        self.similar && !self.manual_review && self.confidence >= min_confidence
    }
}

/// Pairwise semantic comparison
#[async_trait]
pub trait SemanticComparator: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &'static str;

    async fn compare(&self, name_a: &str, name_b: &str) -> Result<SemanticVerdict, ComparatorError>;
}

// ============================================================================
// HTTP comparator
// ============================================================================

/// Minimum spacing between outbound requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Comparator rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Debug, Serialize)]
struct CompareRequest<'a> {
    name_a: &'a str,
    name_b: &'a str,
}

/// Classification endpoint client
///
/// Request: `POST {endpoint}` with `{"name_a": ..., "name_b": ...}`
/// Response: `{"similar": bool, "confidence": f64, "reason": str}`
pub struct HttpSemanticComparator {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSemanticComparator {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, ComparatorError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ComparatorError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl SemanticComparator for HttpSemanticComparator {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn compare(&self, name_a: &str, name_b: &str) -> Result<SemanticVerdict, ComparatorError> {
        self.rate_limiter.wait().await;

        tracing::debug!(name_a, name_b, endpoint = %self.endpoint, "Querying semantic comparator");

        let mut request = self
            .http_client
            .post(&self.endpoint)
            .json(&CompareRequest { name_a, name_b });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ComparatorError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 401 || status == 403 {
            return Err(ComparatorError::InvalidApiKey);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ComparatorError::ApiError(status.as_u16(), error_text));
        }

        let mut verdict: SemanticVerdict = response
            .json()
            .await
            .map_err(|e| ComparatorError::ParseError(e.to_string()))?;

        if !verdict.confidence.is_finite() || !(0.0..=1.0).contains(&verdict.confidence) {
            return Err(ComparatorError::ParseError(format!(
                "confidence out of range: {}",
                verdict.confidence
            )));
        }
        verdict.manual_review = false;

        tracing::debug!(
            name_a,
            name_b,
            similar = verdict.similar,
            confidence = verdict.confidence,
            "Semantic comparison complete"
        );

        Ok(verdict)
    }
}

// ============================================================================
// Offline comparator
// ============================================================================

/// Established alternate spellings, compared after singularizing
const SPELLING_VARIANTS: &[(&str, &str)] = &[
    ("chile", "chili"),
    ("chili", "chilli"),
    ("chile", "chilli"),
    ("donut", "doughnut"),
    ("jalapeno", "jalapeño"),
    ("whiskey", "whisky"),
    ("yoghurt", "yogurt"),
    ("yogourt", "yogurt"),
];

/// Deterministic offline comparator
///
/// Similar only when both names have the same number of words and each word
/// pair is equal after singularizing or is a listed alternate spelling.
/// Everything else (including one-letter differences such as chive/chile or
/// butter/batter) is answered "not similar".
#[derive(Debug, Clone, Default)]
pub struct HeuristicComparator;

impl HeuristicComparator {
    pub fn new() -> Self {
        Self
    }
}

/// 1.0 for the same singular word, 0.9 for a listed spelling, `None` otherwise
fn word_agreement(a: &str, b: &str) -> Option<f64> {
    if a == b {
        return Some(1.0);
    }
    SPELLING_VARIANTS
        .iter()
        .any(|&(x, y)| (a == x && b == y) || (a == y && b == x))
        .then_some(0.9)
}

#[async_trait]
impl SemanticComparator for HeuristicComparator {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn compare(&self, name_a: &str, name_b: &str) -> Result<SemanticVerdict, ComparatorError> {
        let a = normalize_name(name_a);
        let b = normalize_name(name_b);
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        let words_a: Vec<String> = a.split(' ').filter(|w| !w.is_empty()).map(singularize_word).collect();
        let words_b: Vec<String> = b.split(' ').filter(|w| !w.is_empty()).map(singularize_word).collect();

        if words_a.is_empty() || words_a.len() != words_b.len() {
            return Ok(SemanticVerdict {
                similar: false,
                confidence: 0.9,
                reason: "different word structure".to_string(),
                manual_review: false,
            });
        }

        let scores: Option<Vec<f64>> = words_a
            .iter()
            .zip(words_b.iter())
            .map(|(x, y)| word_agreement(x, y))
            .collect();

        match scores {
            Some(scores) => Ok(SemanticVerdict {
                similar: true,
                confidence: scores.iter().sum::<f64>() / scores.len() as f64,
                reason: "plural or known spelling variant".to_string(),
                manual_review: false,
            }),
            None => Ok(SemanticVerdict {
                similar: false,
                confidence: 0.8,
                reason: "words differ beyond plural or known spelling".to_string(),
                manual_review: false,
            }),
        }
    }
}

// ============================================================================
// Resilience wrapper
// ============================================================================

/// Bounded, fail-closed wrapper around a comparator
#[derive(Clone)]
pub struct ResilientComparator {
    inner: Arc<dyn SemanticComparator>,
    timeout: Duration,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl ResilientComparator {
    pub fn new(inner: Arc<dyn SemanticComparator>, timeout_ms: u64, max_attempts: u32) -> Self {
        Self {
            inner,
            timeout: Duration::from_millis(timeout_ms),
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the delay before the second attempt (doubles thereafter)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn inner_name(&self) -> &'static str {
        self.inner.name()
    }

    /// Compare a pair; never fails
    ///
    /// **Algorithm:**
    /// 1. Call the inner comparator under a hard timeout
    /// 2. On a retryable error, back off (doubling) and retry up to max_attempts
    /// 3. On exhaustion or a non-retryable error, return a fallback verdict
    ///    (`similar: false`, `manual_review: true`)
    pub async fn semantic_compare(&self, name_a: &str, name_b: &str) -> SemanticVerdict {
        let mut backoff = self.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            let result = match tokio::time::timeout(self.timeout, self.inner.compare(name_a, name_b)).await {
                Ok(result) => result,
                Err(_) => Err(ComparatorError::Timeout(self.timeout.as_millis() as u64)),
            };

            match result {
                Ok(verdict) => return verdict,
                Err(e) => {
                    let retryable = e.is_retryable();
                    tracing::warn!(
                        comparator = self.inner.name(),
                        name_a,
                        name_b,
                        attempt,
                        max_attempts = self.max_attempts,
                        retryable,
                        error = %e,
                        "Semantic comparison failed"
                    );
                    last_error = e.to_string();

                    if !retryable {
                        break;
                    }
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        SemanticVerdict::fallback(format!("comparator unavailable: {}", last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingComparator {
        calls: AtomicU32,
        error: fn() -> ComparatorError,
    }

    #[async_trait]
    impl SemanticComparator for FailingComparator {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn compare(&self, _a: &str, _b: &str) -> Result<SemanticVerdict, ComparatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    struct SlowComparator;

    #[async_trait]
    impl SemanticComparator for SlowComparator {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn compare(&self, _a: &str, _b: &str) -> Result<SemanticVerdict, ComparatorError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(SemanticVerdict {
                similar: true,
                confidence: 1.0,
                reason: String::new(),
                manual_review: false,
            })
        }
    }

    #[tokio::test]
    async fn test_heuristic_accepts_spelling_variant() {
        let verdict = HeuristicComparator::new()
            .compare("Ancho Chili", "Ancho Chiles")
            .await
            .unwrap();

        assert!(verdict.similar);
        assert!(verdict.permits_merge(0.7), "confidence {}", verdict.confidence);
    }

    #[tokio::test]
    async fn test_heuristic_rejects_synonym_and_structure() {
        let comparator = HeuristicComparator::new();

        assert!(!comparator.compare("Scallion", "Green Onion").await.unwrap().similar);
        assert!(!comparator.compare("Basil", "Cumin").await.unwrap().similar);
        assert!(!comparator.compare("Tomato", "Tomato Sauce").await.unwrap().similar);

        let balsamic = comparator
            .compare("Balsamic Vinegar", "Balsamic Vinaigrette")
            .await
            .unwrap();
        assert!(!balsamic.similar);
        assert!(!balsamic.permits_merge(0.7));
    }

    #[tokio::test]
    async fn test_heuristic_rejects_one_letter_neighbours() {
        let comparator = HeuristicComparator::new();

        for (a, b) in [("Chive", "Chile"), ("Butter", "Batter"), ("Rice", "Ricotta"), ("Pear", "Peas")] {
            let verdict = comparator.compare(a, b).await.unwrap();
            assert!(!verdict.similar, "{} / {}", a, b);
            assert!(!verdict.permits_merge(0.0));
        }
    }

    #[tokio::test]
    async fn test_heuristic_accepts_plural() {
        let verdict = HeuristicComparator::new()
            .compare("Bean Sprout", "Bean Sprouts")
            .await
            .unwrap();
        assert!(verdict.similar);
        assert_eq!(verdict.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_heuristic_is_symmetric() {
        let comparator = HeuristicComparator::new();
        let ab = comparator.compare("Jalapeno Pepper", "Jalapeño Peppers").await.unwrap();
        let ba = comparator.compare("Jalapeño Peppers", "Jalapeno Pepper").await.unwrap();
        assert_eq!(ab, ba);
    }

    #[tokio::test]
    async fn test_retryable_errors_exhaust_attempts_then_fail_closed() {
        let inner = Arc::new(FailingComparator {
            calls: AtomicU32::new(0),
            error: || ComparatorError::NetworkError("connection refused".to_string()),
        });
        let comparator = ResilientComparator::new(inner.clone(), 1000, 3)
            .with_initial_backoff(Duration::from_millis(1));

        let verdict = comparator.semantic_compare("Chili", "Chile").await;

        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert!(!verdict.similar);
        assert!(verdict.manual_review);
        assert!(!verdict.permits_merge(0.0));
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let inner = Arc::new(FailingComparator {
            calls: AtomicU32::new(0),
            error: || ComparatorError::InvalidApiKey,
        });
        let comparator = ResilientComparator::new(inner.clone(), 1000, 3);

        let verdict = comparator.semantic_compare("Chili", "Chile").await;

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert!(verdict.manual_review);
    }

    #[tokio::test]
    async fn test_timeout_fails_closed() {
        let comparator = ResilientComparator::new(Arc::new(SlowComparator), 20, 2)
            .with_initial_backoff(Duration::from_millis(1));

        let started = Instant::now();
        let verdict = comparator.semantic_compare("Chili", "Chile").await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!verdict.similar);
        assert!(verdict.manual_review);
        assert!(verdict.reason.contains("timed out"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ComparatorError::ApiError(503, String::new()).is_retryable());
        assert!(ComparatorError::ApiError(429, String::new()).is_retryable());
        assert!(!ComparatorError::ApiError(400, String::new()).is_retryable());
        assert!(!ComparatorError::ParseError(String::new()).is_retryable());
    }

    #[test]
    fn test_client_creation() {
        let client = HttpSemanticComparator::new("http://localhost:9/compare".to_string(), None);
        assert!(client.is_ok());
    }
}
