mod common;

use common::*;
use std::sync::Arc;

#[tokio::test]
async fn visual_match_enriches_the_classification() {
    let query = blue_tank_image();
    let search = Arc::new(StaticSearch::new(vec![
        make_candidate("Garden hose", "", "https://shop/hose.png"),
        make_candidate("LG 퓨리케어 가습기", "HW500DAS", "https://shop/tank.png"),
    ]));
    let fetcher = MemoryFetcher::default()
        .with("https://shop/hose.png", &green_pattern_image())
        .with("https://shop/tank.png", &query);

    let pipeline = pipeline_reading(&["LG 가습기"]).with_candidates(search.clone(), Arc::new(fetcher));
    let result = pipeline.classify_bytes(png_bytes(&query)).await;

    assert!(result.success);
    assert_eq!(result.outcome, Outcome::Matched);
    assert_eq!(result.category, "가습기");
    assert_eq!(result.brand, "lg");
    assert_eq!(result.model, "HW500DAS");
    assert_eq!(result.product_title.as_deref(), Some("LG 퓨리케어 가습기"));
    assert_eq!(result.source.as_deref(), Some("test-shop"));
    let similarity = result.similarity.unwrap();
    assert!(similarity > 0.99);
    assert_eq!(result.confidence, (similarity * 1.2).min(1.0));

    let queries = search.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].brand, "lg");
    assert_eq!(queries[0].category, "가습기");
}

#[tokio::test]
async fn missing_model_is_read_from_the_title() {
    let query = blue_tank_image();
    let search = Arc::new(StaticSearch::new(vec![make_candidate(
        "LG 가습기 HW-5000",
        "",
        "tank",
    )]));
    let fetcher = MemoryFetcher::default().with("tank", &query);

    let result = pipeline_reading(&["LG 가습기"])
        .with_candidates(search, Arc::new(fetcher))
        .classify_bytes(png_bytes(&query))
        .await;
    assert_eq!(result.outcome, Outcome::Matched);
    assert_eq!(result.model, "HW-5000");
}

#[tokio::test]
async fn zero_candidates_keeps_the_classification() {
    let pipeline = pipeline_reading(&["LG 가습기"]).with_candidates(
        Arc::new(StaticSearch::new(Vec::new())),
        Arc::new(MemoryFetcher::default()),
    );
    let result = pipeline.classify_bytes(png_bytes(&blue_tank_image())).await;

    assert!(result.success);
    assert_eq!(result.outcome, Outcome::Classified);
    assert_eq!(result.category, "가습기");
    assert!(result.similarity.is_none());
    assert_eq!(result.notes, vec!["no visual match found".to_string()]);
}

#[tokio::test]
async fn dissimilar_candidates_do_not_match() {
    let search = Arc::new(StaticSearch::new(vec![make_candidate(
        "Garden hose",
        "GH100",
        "hose",
    )]));
    let fetcher = MemoryFetcher::default().with("hose", &green_pattern_image());

    let result = pipeline_reading(&["LG 가습기"])
        .with_candidates(search, Arc::new(fetcher))
        .classify_bytes(png_bytes(&blue_tank_image()))
        .await;
    assert_eq!(result.outcome, Outcome::Classified);
    assert!(result.product_title.is_none());
    assert_eq!(result.notes, vec!["no visual match found".to_string()]);
}

#[tokio::test]
async fn unreachable_candidate_images_are_skipped() {
    let search = Arc::new(StaticSearch::new(vec![
        make_candidate("Broken link", "", "https://shop/404.png"),
        make_candidate("LG 가습기", "", "https://shop/tank.png"),
    ]));
    let fetcher = MemoryFetcher::default().with("https://shop/tank.png", &blue_tank_image());

    let result = pipeline_reading(&["LG 가습기"])
        .with_candidates(search, Arc::new(fetcher))
        .classify_bytes(png_bytes(&blue_tank_image()))
        .await;
    assert_eq!(result.outcome, Outcome::Matched);
    assert_eq!(result.product_title.as_deref(), Some("LG 가습기"));
}

#[tokio::test]
async fn search_failure_is_noted_not_fatal() {
    let result = pipeline_reading(&["LG 가습기"])
        .with_candidates(Arc::new(FailingSearch), Arc::new(MemoryFetcher::default()))
        .classify_bytes(png_bytes(&blue_tank_image()))
        .await;

    assert!(result.success);
    assert_eq!(result.outcome, Outcome::Classified);
    assert_eq!(result.notes.len(), 1);
    assert!(result.notes[0].starts_with("similarity ranking skipped"));
    assert!(result.notes[0].contains("search service unavailable"));
}

#[tokio::test]
async fn unclassified_photos_are_not_searched() {
    let search = Arc::new(StaticSearch::new(Vec::new()));
    let result = pipeline_reading(&["humidifier"])
        .with_candidates(search.clone(), Arc::new(MemoryFetcher::default()))
        .classify_bytes(png_bytes(&blue_tank_image()))
        .await;

    assert_eq!(result.outcome, Outcome::BrandUndetermined);
    assert!(search.queries.lock().unwrap().is_empty());
    assert!(result.notes.is_empty());
}
