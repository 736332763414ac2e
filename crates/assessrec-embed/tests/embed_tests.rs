use assessrec_core::traits::Embedder;
use assessrec_embed::{get_default_embedder, HashedEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[test]
fn fake_embedder_shapes_and_determinism() {
    // Force the hashed embedder to avoid loading model weights
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");

    let embedder = get_default_embedder().expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), embedder.dim());
    assert!(embedder.embedder_id().starts_with("hashed:"));

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn shared_words_score_higher_than_unrelated_text() {
    let embedder = HashedEmbedder::new(384);
    let query = embedder.embed_one("java developer").expect("query");
    let related = embedder.embed_one("core java programming test for developer roles").expect("related");
    let unrelated = embedder.embed_one("personality questionnaire about teamwork").expect("unrelated");

    assert!(cosine(&query, &related) > cosine(&query, &unrelated));
}

#[test]
fn id_encodes_dimension() {
    assert_ne!(HashedEmbedder::new(128).embedder_id(), HashedEmbedder::new(256).embedder_id());
}
