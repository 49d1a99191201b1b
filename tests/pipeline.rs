//! End-to-end pipeline and API tests with scripted store and oracle
//! implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use tower::util::ServiceExt;

use finecast::config::Config;
use finecast::error::PredictError;
use finecast::models::{CaseInput, PrecedentCase, SearchHit, SimilarityAssessment};
use finecast::oracle::{OracleError, ReasoningOracle};
use finecast::pipeline::Predictor;
use finecast::server::build_router;
use finecast::store::{PrecedentStore, StoreError};

// ============ Scripted collaborators ============

/// In-memory precedent store with per-method call counters.
struct ScriptedStore {
    hits: Vec<SearchHit>,
    cases: HashMap<String, PrecedentCase>,
    /// Detail fetches for these ids fail.
    broken_details: Vec<String>,
    search_calls: AtomicUsize,
    detail_calls: AtomicUsize,
}

impl ScriptedStore {
    fn new(hits: Vec<SearchHit>, cases: Vec<PrecedentCase>) -> Self {
        Self {
            hits,
            cases: cases.into_iter().map(|c| (c.id.clone(), c)).collect(),
            broken_details: Vec::new(),
            search_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PrecedentStore for ScriptedStore {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, StoreError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.clone())
    }

    async fn fetch_detail(&self, case_id: &str) -> Result<PrecedentCase, StoreError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_details.iter().any(|id| id == case_id) {
            return Err(StoreError::Server {
                status: 500,
                body: "scripted detail failure".into(),
            });
        }
        self.cases
            .get(case_id)
            .cloned()
            .ok_or_else(|| StoreError::Malformed(format!("unknown case {case_id}")))
    }
}

/// Oracle that returns a fixed similarity per case id; unknown ids fail,
/// ids in `slow` stall past any worker timeout.
struct ScriptedOracle {
    similarities: HashMap<String, u8>,
    slow: Vec<String>,
    score_calls: AtomicUsize,
}

impl ScriptedOracle {
    fn new(similarities: &[(&str, u8)]) -> Self {
        Self {
            similarities: similarities
                .iter()
                .map(|(id, s)| (id.to_string(), *s))
                .collect(),
            slow: Vec::new(),
            score_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn score(
        &self,
        _input: &CaseInput,
        precedent: &PrecedentCase,
    ) -> Result<SimilarityAssessment, OracleError> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        if self.slow.iter().any(|id| id == &precedent.id) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match self.similarities.get(&precedent.id) {
            Some(similarity) => Ok(SimilarityAssessment {
                precedent_id: precedent.id.clone(),
                similarity: *similarity,
                explanation: format!("scripted comparison for {}", precedent.id),
            }),
            None => Err(OracleError::Malformed("no script for case".into())),
        }
    }

    async fn narrate(
        &self,
        _input: &CaseInput,
        _evidence: &[(PrecedentCase, SimilarityAssessment)],
        predicted_fine: u64,
    ) -> Result<String, OracleError> {
        Ok(format!("The weighted evidence supports EUR {predicted_fine}."))
    }
}

// ============ Fixtures ============

fn precedent(id: &str, fine: u64) -> PrecedentCase {
    PrecedentCase {
        id: id.to_string(),
        company: format!("Company {id}"),
        description: format!("Violation recorded for {id}"),
        fine,
        date: NaiveDate::from_ymd_opt(2022, 3, 15).unwrap(),
        authority: "Irish DPC".into(),
        chunks: vec![format!("detail chunk for {id}")],
    }
}

fn hit(chunk: &str, case_id: &str, score: f64) -> SearchHit {
    SearchHit {
        chunk_id: chunk.to_string(),
        case_id: case_id.to_string(),
        score,
    }
}

fn valid_input() -> CaseInput {
    CaseInput::parse(
        "A healthcare company failed to revoke access for former employees, \
         exposing 50,000 patient records.",
        "no_valid_basis",
        "non_compliance",
        "insufficient_protection",
        "not_accountable",
    )
    .unwrap()
}

fn test_config() -> Config {
    toml::from_str(
        r#"
[server]
bind = "127.0.0.1:0"

[store]
url = "http://unused.invalid"

[analysis]
worker_timeout_secs = 1

[oracle]
url = "http://unused.invalid"
model = "scripted"
timeout_secs = 1
"#,
    )
    .unwrap()
}

fn predictor(store: Arc<ScriptedStore>, oracle: Arc<ScriptedOracle>) -> Predictor {
    Predictor::new(store, oracle, &test_config())
}

// ============ Pipeline tests ============

#[tokio::test]
async fn happy_path_returns_weighted_prediction() {
    let store = Arc::new(ScriptedStore::new(
        vec![
            hit("c1", "case-a", 0.9),
            hit("c2", "case-b", 0.8),
            hit("c3", "case-c", 0.7),
        ],
        vec![
            precedent("case-a", 1_000_000),
            precedent("case-b", 500_000),
            precedent("case-c", 10_000_000),
        ],
    ));
    let oracle = Arc::new(ScriptedOracle::new(&[
        ("case-a", 90),
        ("case-b", 40),
        ("case-c", 70),
    ]));

    let result = predictor(Arc::clone(&store), Arc::clone(&oracle))
        .predict(valid_input())
        .await
        .unwrap();

    // (1e6*90 + 5e5*40 + 1e7*70) / (90+40+70) = 810e6 / 200 = 4.05e6
    assert_eq!(result.prediction.predicted_fine, 4_050_000);
    assert_eq!(result.similar_cases.len(), 3);
    // Sorted by similarity descending.
    let sims: Vec<u8> = result
        .similar_cases
        .iter()
        .map(|(_, a)| a.similarity)
        .collect();
    assert_eq!(sims, vec![90, 70, 40]);
    // Narrative came from the oracle and references the fixed number.
    assert!(result.prediction.explanation.contains("4050000"));
}

#[tokio::test]
async fn shortlist_caps_at_five_unique_cases() {
    let hits: Vec<SearchHit> = (0..20)
        .flat_map(|i| {
            let id = format!("case-{i}");
            vec![
                hit(&format!("c{i}a"), &id, 1.0 - i as f64 * 0.01),
                hit(&format!("c{i}b"), &id, 0.9 - i as f64 * 0.01),
            ]
        })
        .collect();
    let cases: Vec<PrecedentCase> = (0..20)
        .map(|i| precedent(&format!("case-{i}"), 100_000 * (i + 1) as u64))
        .collect();
    let sims: Vec<(String, u8)> = (0..20).map(|i| (format!("case-{i}"), 50u8)).collect();
    let sims_ref: Vec<(&str, u8)> = sims.iter().map(|(s, v)| (s.as_str(), *v)).collect();

    let store = Arc::new(ScriptedStore::new(hits, cases));
    let oracle = Arc::new(ScriptedOracle::new(&sims_ref));

    let result = predictor(store, Arc::clone(&oracle))
        .predict(valid_input())
        .await
        .unwrap();

    assert_eq!(result.similar_cases.len(), 5);
    assert_eq!(oracle.score_calls.load(Ordering::SeqCst), 5);
    for (_, assessment) in &result.similar_cases {
        assert!(assessment.similarity <= 100);
    }
}

#[tokio::test]
async fn zero_hits_is_no_precedents_and_spawns_no_workers() {
    let store = Arc::new(ScriptedStore::new(vec![], vec![]));
    let oracle = Arc::new(ScriptedOracle::new(&[]));

    let err = predictor(Arc::clone(&store), Arc::clone(&oracle))
        .predict(valid_input())
        .await
        .unwrap_err();

    assert!(matches!(err, PredictError::NoPrecedentsFound));
    assert_eq!(store.search_calls.load(Ordering::SeqCst), 1);
    assert_eq!(oracle.score_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_detail_fetch_drops_candidate_not_request() {
    let mut store = ScriptedStore::new(
        vec![hit("c1", "case-a", 0.9), hit("c2", "case-b", 0.8)],
        vec![precedent("case-a", 2_000_000), precedent("case-b", 800_000)],
    );
    store.broken_details.push("case-a".into());
    let oracle = Arc::new(ScriptedOracle::new(&[("case-b", 60)]));

    let result = predictor(Arc::new(store), oracle)
        .predict(valid_input())
        .await
        .unwrap();

    assert_eq!(result.similar_cases.len(), 1);
    assert_eq!(result.similar_cases[0].0.id, "case-b");
    assert_eq!(result.prediction.predicted_fine, 800_000);
}

#[tokio::test]
async fn all_detail_fetches_failing_is_no_precedents() {
    let mut store = ScriptedStore::new(
        vec![hit("c1", "case-a", 0.9)],
        vec![precedent("case-a", 2_000_000)],
    );
    store.broken_details.push("case-a".into());
    let oracle = Arc::new(ScriptedOracle::new(&[]));

    let err = predictor(Arc::new(store), Arc::clone(&oracle))
        .predict(valid_input())
        .await
        .unwrap_err();

    assert!(matches!(err, PredictError::NoPrecedentsFound));
    assert_eq!(oracle.score_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn store_timeout_maps_to_timeout_error() {
    struct TimeoutStore;
    #[async_trait]
    impl PrecedentStore for TimeoutStore {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, StoreError> {
            Err(StoreError::Timeout)
        }
        async fn fetch_detail(&self, _case_id: &str) -> Result<PrecedentCase, StoreError> {
            unreachable!("search already failed")
        }
    }

    let oracle = Arc::new(ScriptedOracle::new(&[]));
    let err = Predictor::new(Arc::new(TimeoutStore), oracle, &test_config())
        .predict(valid_input())
        .await
        .unwrap_err();

    assert!(matches!(err, PredictError::Timeout(_)));
    assert_eq!(err.http_status(), 504);
}

#[tokio::test]
async fn store_failure_maps_to_retrieval_error() {
    struct DownStore;
    #[async_trait]
    impl PrecedentStore for DownStore {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, StoreError> {
            Err(StoreError::Server {
                status: 503,
                body: "unavailable".into(),
            })
        }
        async fn fetch_detail(&self, _case_id: &str) -> Result<PrecedentCase, StoreError> {
            unreachable!("search already failed")
        }
    }

    let oracle = Arc::new(ScriptedOracle::new(&[]));
    let err = Predictor::new(Arc::new(DownStore), oracle, &test_config())
        .predict(valid_input())
        .await
        .unwrap_err();

    assert!(matches!(err, PredictError::Retrieval(_)));
    assert_eq!(err.http_status(), 502);
}

#[tokio::test]
async fn one_slow_worker_degrades_to_fallback_without_failing() {
    let ids = ["case-a", "case-b", "case-c", "case-d", "case-e"];
    let hits: Vec<SearchHit> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| hit(&format!("c{i}"), id, 1.0 - i as f64 * 0.1))
        .collect();
    let cases: Vec<PrecedentCase> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| precedent(id, 1_000_000 * (i + 1) as u64))
        .collect();

    let store = Arc::new(ScriptedStore::new(hits, cases));
    let mut oracle = ScriptedOracle::new(&[
        ("case-a", 90),
        ("case-b", 80),
        ("case-c", 70),
        ("case-d", 60),
        ("case-e", 50),
    ]);
    oracle.slow.push("case-c".into()); // exceeds worker_timeout_secs = 1

    let result = predictor(store, Arc::new(oracle))
        .predict(valid_input())
        .await
        .unwrap();

    assert_eq!(result.similar_cases.len(), 5, "count-preserving join");
    let fallbacks: Vec<_> = result
        .similar_cases
        .iter()
        .filter(|(_, a)| a.similarity == 0)
        .collect();
    assert_eq!(fallbacks.len(), 1);
    assert_eq!(fallbacks[0].0.id, "case-c");
    assert!(fallbacks[0].1.explanation.contains("could not be completed"));
    // Fallback entries sort last and are excluded from the weighting:
    // (1e6*90 + 2e6*80 + 4e6*60 + 5e6*50) / (90+80+60+50) = 740e6/280.
    assert_eq!(result.prediction.predicted_fine, 2_642_857);
}

#[tokio::test]
async fn deterministic_given_fixed_assessments() {
    let build = || {
        let store = Arc::new(ScriptedStore::new(
            vec![hit("c1", "case-a", 0.9), hit("c2", "case-b", 0.8)],
            vec![precedent("case-a", 3_000_000), precedent("case-b", 600_000)],
        ));
        let oracle = Arc::new(ScriptedOracle::new(&[("case-a", 75), ("case-b", 25)]));
        predictor(store, oracle)
    };

    let first = build().predict(valid_input()).await.unwrap();
    let second = build().predict(valid_input()).await.unwrap();
    assert_eq!(
        first.prediction.predicted_fine,
        second.prediction.predicted_fine
    );
    let ids = |r: &finecast::models::PipelineResult| {
        r.similar_cases
            .iter()
            .map(|(c, _)| c.id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}

// ============ API tests ============

fn router_with(
    store: Arc<ScriptedStore>,
    oracle: Arc<ScriptedOracle>,
) -> axum::Router {
    build_router(Arc::new(predictor(store, oracle)))
}

fn predict_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict-breach-impact")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn valid_body() -> serde_json::Value {
    serde_json::json!({
        "case_description": "Unauthorized access to patient records",
        "lawfulness_of_processing": "no_valid_basis",
        "data_subject_rights_compliance": "non_compliance",
        "risk_management_and_safeguards": "insufficient_protection",
        "accountability_and_governance": "not_accountable"
    })
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn api_happy_path_matches_contract() {
    let store = Arc::new(ScriptedStore::new(
        vec![hit("c1", "case-a", 0.9)],
        vec![precedent("case-a", 1_500_000)],
    ));
    let oracle = Arc::new(ScriptedOracle::new(&[("case-a", 80)]));
    let app = router_with(store, oracle);

    let response = app.oneshot(predict_request(valid_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    let cases = json["similar_cases"].as_array().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0]["id"], "case-a");
    assert_eq!(cases[0]["fine"], 1_500_000);
    assert_eq!(cases[0]["similarity"], 80);
    assert_eq!(cases[0]["date"], "2022-03-15");
    assert!(cases[0]["explanation_of_similarity"].is_string());
    assert_eq!(json["prediction_result"]["predicted_fine"], 1_500_000);
    assert!(json["prediction_result"]["explanation_for_fine"].is_string());
}

#[tokio::test]
async fn api_rejects_invalid_enum_before_any_retrieval() {
    let store = Arc::new(ScriptedStore::new(vec![], vec![]));
    let oracle = Arc::new(ScriptedOracle::new(&[]));
    let app = router_with(Arc::clone(&store), oracle);

    let mut body = valid_body();
    body["risk_management_and_safeguards"] = serde_json::json!("catastrophic");

    let response = app.oneshot(predict_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "invalid_input");
    let message = json["error"]["message"].as_str().unwrap();
    assert!(message.contains("risk_management_and_safeguards"));
    assert!(message.contains("insufficient_protection")); // lists accepted values

    assert_eq!(
        store.search_calls.load(Ordering::SeqCst),
        0,
        "no retrieval call may be issued for invalid input"
    );
}

#[tokio::test]
async fn api_maps_empty_corpus_to_422() {
    let store = Arc::new(ScriptedStore::new(vec![], vec![]));
    let oracle = Arc::new(ScriptedOracle::new(&[]));
    let app = router_with(store, oracle);

    let response = app.oneshot(predict_request(valid_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "no_precedents_found");
}

#[tokio::test]
async fn health_reports_ok() {
    let store = Arc::new(ScriptedStore::new(vec![], vec![]));
    let oracle = Arc::new(ScriptedOracle::new(&[]));
    let app = router_with(store, oracle);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}
