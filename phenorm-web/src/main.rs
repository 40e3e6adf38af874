//! Servidor web Axum para normalização de fenótipos e avaliação via HTTP e WebSocket

use std::sync::{mpsc, Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use phenorm_core::{
    corpus::read_dataset_tsv,
    eval::{compare, compare_streaming, EvalEvent},
    ontology_io::load_hpo,
    Dataset, EvalOptions, LoadOptions, MatchingResources, ObservationDictionary, OntologySources,
    Term,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Configuração lida de variáveis de ambiente.
///
/// Listas de arquivos são separadas por vírgula.
#[derive(Debug, Clone, PartialEq)]
struct ServerConfig {
    addr: String,
    ontology: OntologySources,
    observation_dict: Option<String>,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let list = |key: &str| -> Vec<String> {
            lookup(key)
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|path| !path.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            addr: lookup("PHENORM_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            ontology: OntologySources {
                json: list("PHENORM_HPO_JSON"),
                tsv: list("PHENORM_HPO_TSV"),
                exclude_tsv: list("PHENORM_EXCLUDE_TSV"),
                ..OntologySources::default()
            },
            observation_dict: lookup("PHENORM_OBSERVATION_DICT").filter(|p| !p.is_empty()),
        }
    }

    fn build_resources(&self) -> phenorm_core::Result<MatchingResources> {
        let hpo = load_hpo(&self.ontology)?;
        let observations = match &self.observation_dict {
            Some(path) => ObservationDictionary::from_json(std::fs::File::open(path)?)?,
            None => ObservationDictionary::new(),
        };
        Ok(MatchingResources::build(hpo, observations))
    }
}

/// Estado compartilhado da aplicação
struct AppState {
    resources: MatchingResources,
}

#[derive(Deserialize)]
struct TermInput {
    label: String,
    /// Spans no formato `"0-5,7-9"`.
    #[serde(default)]
    spans: Option<String>,
    /// Texto com a menção marcada entre colchetes.
    #[serde(default)]
    tagged: Option<String>,
}

#[derive(Deserialize)]
struct NormalizeRequest {
    text: String,
    #[serde(default)]
    terms: Vec<TermInput>,
}

#[derive(Serialize)]
struct NormalizedTerm {
    preferred_label: String,
    concept_id: Option<String>,
    provenance: String,
    spans: String,
    observed_text: String,
}

#[derive(Serialize)]
struct NormalizeResponse {
    terms: Vec<NormalizedTerm>,
}

/// Corpus verdadeiro e predito no formato TSV de 5 colunas.
#[derive(Deserialize)]
struct EvaluateRequest {
    truth: String,
    predicted: String,
    #[serde(default)]
    options: EvalOptions,
    #[serde(default)]
    load: LoadOptions,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    let resources = config.build_resources()?;
    info!(
        "Recursos carregados: {} conceitos, {} chaves no dicionário",
        resources.hpo.len(),
        resources.dictionary.len()
    );

    let app = router(Arc::new(AppState { resources }));

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    info!("🚀 Servidor phenorm iniciado em http://{}", config.addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/normalize", post(normalize_handler))
        .route("/evaluate", post(evaluate_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

fn bad_request(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message.to_string()})),
    )
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "concepts": state.resources.hpo.len(),
        "dictionary_keys": state.resources.dictionary.len(),
    }))
}

fn build_term(text: &str, input: &TermInput) -> phenorm_core::Result<Term> {
    match (&input.tagged, &input.spans) {
        (Some(tagged), _) => Term::from_tagged_text(input.label.as_str(), tagged, text),
        (None, Some(spans)) => Term::with_span_text(None, input.label.as_str(), false, spans, text),
        (None, None) => Ok(Term::new(None, input.label.as_str(), false, Vec::new(), text)),
    }
}

/// Normaliza os termos de um texto (sem streaming)
async fn normalize_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NormalizeRequest>,
) -> Response {
    if req.text.trim().is_empty() {
        return bad_request("Texto vazio");
    }

    let matcher = state.resources.matcher();
    let mut terms = Vec::with_capacity(req.terms.len());
    for input in &req.terms {
        let mut term = match build_term(&req.text, input) {
            Ok(term) => term,
            Err(e) => return bad_request(e),
        };
        matcher.normalize_term(&mut term);
        terms.push(NormalizedTerm {
            preferred_label: term.preferred_label().to_string(),
            concept_id: term.concept_id.clone(),
            provenance: term.provenance.map(|p| p.label()).unwrap_or_default(),
            spans: term.span_text(),
            observed_text: term.observed_text(),
        });
    }

    Json(NormalizeResponse { terms }).into_response()
}

fn parse_corpora(state: &AppState, req: &EvaluateRequest) -> phenorm_core::Result<(Dataset, Dataset)> {
    let hpo = Some(&state.resources.hpo);
    let truth = read_dataset_tsv(req.truth.as_bytes(), hpo, &req.load)?;
    let predicted = read_dataset_tsv(req.predicted.as_bytes(), hpo, &req.load)?;
    Ok((truth, predicted))
}

/// Avalia um corpus predito contra o verdadeiro e retorna as métricas
async fn evaluate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> Response {
    // A avaliação é síncrona e paralela (rayon): fora do runtime
    let result = tokio::task::spawn_blocking(move || {
        let (truth, predicted) = parse_corpora(&state, &req)?;
        compare(&truth, &predicted, &state.resources.matcher(), &req.options)
    })
    .await;

    match result {
        Ok(Ok(scores)) => Json(scores).into_response(),
        Ok(Err(e)) => bad_request(e),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

/// Upgrade HTTP → WebSocket
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Executa a avaliação emitindo os eventos de progresso na ordem.
fn evaluate_events(state: &AppState, req: &EvaluateRequest) -> Vec<EvalEvent> {
    let (truth, predicted) = match parse_corpora(state, req) {
        Ok(corpora) => corpora,
        Err(e) => {
            return vec![EvalEvent::Error {
                message: e.to_string(),
            }]
        }
    };

    let (tx, rx) = mpsc::channel::<EvalEvent>();
    if let Err(e) = compare_streaming(&truth, &predicted, &state.resources.matcher(), &req.options, tx) {
        warn!("Avaliação via WebSocket falhou: {}", e);
    }
    rx.try_iter().collect()
}

/// Lógica do WebSocket: recebe uma requisição de avaliação e envia os eventos
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket conectado");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let events = match serde_json::from_str::<EvaluateRequest>(&text) {
                    Ok(req) => {
                        info!("Avaliando via WebSocket: {} bytes", text.len());
                        let state = Arc::clone(&state);
                        tokio::task::spawn_blocking(move || evaluate_events(&state, &req))
                            .await
                            .unwrap_or_else(|e| {
                                vec![EvalEvent::Error {
                                    message: e.to_string(),
                                }]
                            })
                    }
                    Err(e) => vec![EvalEvent::Error {
                        message: e.to_string(),
                    }],
                };

                for event in &events {
                    if let Ok(json) = serde_json::to_string(event) {
                        if socket.send(Message::Text(json)).await.is_err() {
                            return; // cliente desconectou
                        }
                    }
                }
            }
            Message::Close(_) => {
                info!("WebSocket desconectado");
                return;
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use phenorm_core::{Concept, Hpo};
    use tower::ServiceExt;

    fn app() -> Router {
        let hpo = Hpo::from(vec![
            Concept::new("HP:0002094")
                .with_preferred_label("Dyspnea")
                .with_synonyms(vec!["Shortness of breath".to_string()]),
            Concept::new("HP:0001945").with_preferred_label("Fever"),
        ]);
        let resources = MatchingResources::build(hpo, ObservationDictionary::new());
        router(Arc::new(AppState { resources }))
    }

    async fn post_json(uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["concepts"], 2);
    }

    #[tokio::test]
    async fn test_normalize_tagged_and_spans() {
        let (status, body) = post_json(
            "/normalize",
            serde_json::json!({
                "text": "Fever and shortness of breath",
                "terms": [
                    {"label": "Breathing problem", "tagged": "Fever and [shortness of breath]"},
                    {"label": "Fever", "spans": "0-5"}
                ]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let terms = body["terms"].as_array().unwrap();
        assert_eq!(terms[0]["concept_id"], "HP:0002094");
        assert_eq!(terms[0]["provenance"], "Observed term by HPO dictionary matching");
        assert_eq!(terms[0]["spans"], "10-29");
        assert_eq!(terms[1]["concept_id"], "HP:0001945");
    }

    #[tokio::test]
    async fn test_normalize_rejects_bad_input() {
        let (status, _) = post_json("/normalize", serde_json::json!({"text": "  "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_json(
            "/normalize",
            serde_json::json!({"text": "Fever", "terms": [{"label": "Fever", "spans": "5-1"}]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("5-1"));
    }

    #[tokio::test]
    async fn test_evaluate() {
        let header = "ObservationID\tText\tHPOTerm\tPolarity\tSpans\n";
        let truth = format!("{header}1\tFever present\tHP:0001945\t\t0-5\n");
        let predicted = format!("{header}1\tFever present\tHP:0001945\t\t0-5\n");
        let (status, body) = post_json(
            "/evaluate",
            serde_json::json!({"truth": truth, "predicted": predicted}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["f1"], 1.0);
        assert_eq!(body["counts"]["tp"], 1);
    }

    #[tokio::test]
    async fn test_evaluate_length_mismatch() {
        let header = "ObservationID\tText\tHPOTerm\tPolarity\tSpans\n";
        let truth = format!("{header}1\tFever\tHP:0001945\t\t0-5\n2\tCough\tNA\t\t\n");
        let predicted = format!("{header}1\tFever\tHP:0001945\t\t0-5\n");
        let (status, body) = post_json(
            "/evaluate",
            serde_json::json!({"truth": truth, "predicted": predicted}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("desalinhados"));
    }

    #[test]
    fn test_evaluate_events() {
        let hpo = Hpo::from(vec![Concept::new("HP:0001945").with_preferred_label("Fever")]);
        let state = AppState {
            resources: MatchingResources::build(hpo, ObservationDictionary::new()),
        };
        let header = "ObservationID\tText\tHPOTerm\tPolarity\tSpans\n";
        let req = EvaluateRequest {
            truth: format!("{header}1\tFever\tHP:0001945\t\t0-5\n2\tCough\tNA\t\t\n"),
            predicted: format!("{header}1\tFever\tHP:0001945\t\t0-5\n2\tCough\tNA\t\t\n"),
            options: EvalOptions::default(),
            load: LoadOptions::default(),
        };
        let events = evaluate_events(&state, &req);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], EvalEvent::Done { .. }));
    }

    #[test]
    fn test_config_from_lookup() {
        let config = ServerConfig::from_lookup(|key| match key {
            "PHENORM_HPO_TSV" => Some("a.tsv, b.tsv".to_string()),
            "PHENORM_OBSERVATION_DICT" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.addr, "0.0.0.0:3000");
        assert_eq!(config.ontology.tsv, vec!["a.tsv", "b.tsv"]);
        assert!(config.ontology.json.is_empty());
        assert_eq!(config.observation_dict, None);
    }
}
