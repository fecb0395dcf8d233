//! End-to-end consultation scenarios with fake providers.

use std::sync::Arc;

use derma_rag::document::Chunk;
use derma_rag::testing::{FailingEmbedder, HashingEmbedder, LookupEmbedder, RecordingModel};
use derma_rag::{
    BuildPolicy, ConsultationError, ConsultationRequest, ConsultationService, ErrorKind,
    GenerationError, IndexRegistry, IndexingConfig, PromptLanguage, ReferenceCorpus,
    RetrievalConfig, ServiceConfig, ServiceContext, StartupError, TopicIndex,
};

fn request(disease: &str, symptoms: &str) -> ConsultationRequest {
    ConsultationRequest {
        disease_name: disease.to_string(),
        fever_status: false,
        blooding_status: false,
        age: 30,
        symptoms: symptoms.to_string(),
    }
}

async fn service_over(
    corpus: &ReferenceCorpus,
    model: Arc<RecordingModel>,
) -> (ConsultationService, Arc<HashingEmbedder>) {
    let embedder = Arc::new(HashingEmbedder::default());
    let (context, report) =
        ServiceContext::from_corpus(&ServiceConfig::default(), corpus, embedder.clone(), model)
            .await
            .unwrap();
    assert!(report.is_complete());
    (ConsultationService::new(Arc::new(context)), embedder)
}

#[tokio::test]
async fn atopic_dermatitis_end_to_end() {
    let reference = "Atopic dermatitis causes itching and redness...";
    let corpus = ReferenceCorpus::from_entries([("atopic_dermatitis", reference)]).unwrap();
    let model = Arc::new(RecordingModel::answering("1. 위험성 낮음"));
    let (service, _) = service_over(&corpus, model.clone()).await;

    let answer = service.answer(&request("atopic_dermatitis", "itchy red patches")).await.unwrap();

    assert_eq!(answer.text, "1. 위험성 낮음");
    assert_eq!(model.call_count(), 1);
    let prompt = &model.prompts()[0];
    assert!(prompt.contains("atopic_dermatitis"));
    assert!(prompt.contains("itchy red patches"));
    assert!(prompt.contains(reference));
    assert!(prompt.contains("false"));
    assert!(prompt.contains("30"));
}

#[tokio::test]
async fn unknown_disease_never_reaches_the_model() {
    let corpus = ReferenceCorpus::from_entries([("atopic_dermatitis", "Itching.")]).unwrap();
    let model = Arc::new(RecordingModel::answering("unused"));
    let (service, embedder) = service_over(&corpus, model.clone()).await;
    let embeds_after_startup = embedder.calls();

    let err = service.answer(&request("unknown_disease", "itchy")).await.unwrap_err();

    assert!(matches!(err, ConsultationError::TopicNotFound(ref e) if e.topic == "unknown_disease"));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(model.call_count(), 0);
    assert_eq!(embedder.calls(), embeds_after_startup);
}

#[tokio::test]
async fn retrieval_stays_within_the_requested_topic() {
    let corpus = ReferenceCorpus::from_entries([
        ("acne", "Acne appears as pimples on oily skin."),
        ("scabies", "Scabies causes intense itching at night from mites."),
    ])
    .unwrap();
    let model = Arc::new(RecordingModel::answering("ok"));
    let (service, _) = service_over(&corpus, model.clone()).await;

    service.answer(&request("acne", "intense itching at night")).await.unwrap();

    let prompt = &model.prompts()[0];
    assert!(prompt.contains("pimples"));
    assert!(!prompt.contains("mites"));
}

#[tokio::test]
async fn five_chunks_with_k_four_returns_most_relevant_first() {
    let vectors = [[0.2, 0.98], [1.0, 0.0], [0.0, 1.0], [0.8, 0.6], [0.6, 0.8]];
    let chunks = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let mut chunk = Chunk::new("eczema", i, format!("fragment-{i}"));
            chunk.embedding = v.to_vec();
            chunk
        })
        .collect();
    let registry = IndexRegistry::from_indices([TopicIndex::from_chunks("eczema", chunks).unwrap()]);
    let embedder = Arc::new(LookupEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(RecordingModel::answering("ok"));

    let context = ServiceContext::builder()
        .registry(registry)
        .embedding_provider(embedder)
        .model(model.clone())
        .retrieval(RetrievalConfig::builder().top_k(4).build().unwrap())
        .build()
        .unwrap();
    let service = ConsultationService::new(Arc::new(context));

    service.answer(&request("eczema", "dry patches")).await.unwrap();

    let prompt = &model.prompts()[0];
    let expected = "fragment-1\nfragment-3\nfragment-4\nfragment-0";
    assert!(prompt.contains(expected), "context block missing from:\n{prompt}");
    assert!(!prompt.contains("fragment-2"));
}

fn ten_topic_corpus() -> ReferenceCorpus {
    ReferenceCorpus::from_entries((0..10).map(|i| {
        let text = if i == 7 { "poisoned reference".to_string() } else { format!("reference {i}") };
        (format!("topic_{i}"), text)
    }))
    .unwrap()
}

#[tokio::test]
async fn one_failing_topic_degrades_gracefully() {
    let embedder = Arc::new(FailingEmbedder::new(HashingEmbedder::default(), "poisoned"));
    let model = Arc::new(RecordingModel::answering("ok"));

    let (context, report) = ServiceContext::from_corpus(
        &ServiceConfig::default(),
        &ten_topic_corpus(),
        embedder,
        model.clone(),
    )
    .await
    .unwrap();

    assert_eq!(context.registry().len(), 9);
    assert_eq!(report.indexed.len(), 9);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].topic(), "topic_7");
    assert!(context.registry().lookup("topic_7").is_err());

    let service = ConsultationService::new(Arc::new(context));
    let err = service.answer(&request("topic_7", "anything")).await.unwrap_err();
    assert!(matches!(err, ConsultationError::TopicNotFound(_)));
    assert!(service.answer(&request("topic_3", "reference")).await.is_ok());
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn one_failing_topic_aborts_startup_under_fail_fast() {
    let embedder = Arc::new(FailingEmbedder::new(HashingEmbedder::default(), "poisoned"));
    let config = ServiceConfig {
        indexing: IndexingConfig { policy: BuildPolicy::FailFast, ..IndexingConfig::default() },
        ..ServiceConfig::default()
    };

    let result = ServiceContext::from_corpus(
        &config,
        &ten_topic_corpus(),
        embedder,
        Arc::new(RecordingModel::answering("ok")),
    )
    .await;

    assert!(matches!(result, Err(StartupError::Registry(_))));
}

#[tokio::test]
async fn startup_reads_corpus_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("medical_dic.json");
    std::fs::write(&path, r#"{"psoriasis": "Psoriasis forms silvery scaly plaques."}"#).unwrap();

    let config = ServiceConfig {
        corpus_path: path,
        prompt_language: PromptLanguage::English,
        ..ServiceConfig::default()
    };
    let (context, _) = ServiceContext::startup(
        &config,
        Arc::new(HashingEmbedder::default()),
        Arc::new(RecordingModel::answering("ok")),
    )
    .await
    .unwrap();

    assert_eq!(context.topics(), vec!["psoriasis"]);
}

#[tokio::test]
async fn missing_corpus_aborts_startup() {
    let config = ServiceConfig {
        corpus_path: "/nonexistent/medical_dic.json".into(),
        ..ServiceConfig::default()
    };
    let result = ServiceContext::startup(
        &config,
        Arc::new(HashingEmbedder::default()),
        Arc::new(RecordingModel::answering("ok")),
    )
    .await;
    assert!(matches!(result, Err(StartupError::Corpus(_))));
}

#[tokio::test]
async fn generation_failure_is_a_server_error() {
    let corpus = ReferenceCorpus::from_entries([("acne", "Acne.")]).unwrap();
    let failure = GenerationError::RateLimited { provider: "fake".into(), message: "slow down".into() };
    let model = Arc::new(RecordingModel::answering("ok").with_script(vec![Err(failure.clone())]));
    let (service, _) = service_over(&corpus, model).await;

    let err = service.answer(&request("acne", "spots")).await.unwrap_err();
    assert!(matches!(err, ConsultationError::Generation(ref e) if *e == failure));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn blank_symptoms_are_rejected_before_lookup() {
    let corpus = ReferenceCorpus::from_entries([("acne", "Acne.")]).unwrap();
    let model = Arc::new(RecordingModel::answering("ok"));
    let (service, _) = service_over(&corpus, model.clone()).await;

    let err = service.answer(&request("acne", "  ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(model.call_count(), 0);
}
