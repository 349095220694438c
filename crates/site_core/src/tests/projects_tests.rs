use super::*;
use serde_json::json;
use std::sync::atomic::Ordering;

use crate::fake_backend::FakeBackend;

fn project_row(id: &str, title: &str, category: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "description": "A project",
        "image_url": "https://images.example/cover.jpg",
        "technologies": ["Rust"],
        "github_url": format!("https://github.com/ctmes/{title}"),
        "live_url": format!("https://github.com/ctmes/{title}"),
        "category": category,
        "created_at": "2024-05-01T10:00:00Z",
    })
}

#[test]
fn categories_parse_by_label() {
    assert_eq!(Category::parse("Full Stack"), Category::FullStack);
    assert_eq!(Category::parse("ai/ml"), Category::AiMl);
    assert_eq!(Category::parse("Robotics"), Category::All);
    assert_eq!(
        Category::ALL.map(Category::label),
        ["All", "Frontend", "Full Stack", "Data Analysis", "AI/ML"]
    );
}

#[test]
fn live_demo_url_swaps_host_and_drops_repo() {
    assert_eq!(
        live_demo_url("https://github.com/ctmes/CheapChow"),
        "https://github.io/ctmes"
    );
    assert_eq!(live_demo_url("https://example.com/"), "https://example.com/");
}

#[tokio::test]
async fn catalog_filters_by_category() {
    let backend = FakeBackend::with_rows(
        PROJECTS_TABLE,
        vec![
            project_row("1", "CheapChow", "Full Stack"),
            project_row("4", "NLP", "AI/ML"),
            project_row("5", "ML", "AI/ML"),
        ],
    );
    let catalog = ProjectCatalog::new(backend);
    assert_eq!(catalog.list().await.len(), 3);
    let ai: Vec<_> = catalog
        .list_in(Category::AiMl)
        .await
        .into_iter()
        .map(|project| project.title)
        .collect();
    assert_eq!(ai, vec!["NLP", "ML"]);
}

#[tokio::test]
async fn get_returns_none_for_missing_or_failed_lookup() {
    let backend = FakeBackend::with_rows(PROJECTS_TABLE, vec![project_row("1", "CheapChow", "Full Stack")]);
    let catalog = ProjectCatalog::new(backend.clone());
    assert_eq!(
        catalog.get("1").await.map(|project| project.title),
        Some("CheapChow".to_string())
    );
    assert!(catalog.get("42").await.is_none());

    backend.offline.store(true, Ordering::SeqCst);
    assert!(catalog.get("1").await.is_none());
    assert!(catalog.list().await.is_empty());
}
