use anyhow::Result;
use backend::{RowQuery, TableStore};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use shared::domain::PROJECTS_TABLE;
use tracing::info;

use crate::{tables::timestamp, Storage};

/// The showcase entries a fresh site starts with, newest first.
pub fn default_projects() -> Vec<Value> {
    let entries = [
        (
            "1",
            "CheapChow",
            "A budget-friendly recipe finder application that helps users discover meals based on their available ingredients",
            "https://images.unsplash.com/photo-1498837167922-ddd27525d352",
            &["Python", "Flask", "SQLite"][..],
            "https://github.com/ctmes/CheapChow",
            "Full Stack",
        ),
        (
            "2",
            "CryptoTwin",
            "Cryptocurrency analysis tool for tracking and comparing digital asset performance",
            "https://images.unsplash.com/photo-1621761191319-c6fb62004040",
            &["Python", "Pandas", "Data Analysis"][..],
            "https://github.com/ctmes/CryptoTwin",
            "Data Analysis",
        ),
        (
            "3",
            "Portfolio Website",
            "Personal portfolio website showcasing projects and skills",
            "https://images.unsplash.com/photo-1507238691740-187a5b1d37b8",
            &["HTML", "CSS", "JavaScript"][..],
            "https://github.com/ctmes/p_cv",
            "Frontend",
        ),
        (
            "4",
            "NLP Projects",
            "Collection of Natural Language Processing projects and experiments",
            "https://images.unsplash.com/photo-1546410531-bb4caa6b424d",
            &["Python", "NLTK", "NLP"][..],
            "https://github.com/ctmes/p_nlp",
            "AI/ML",
        ),
        (
            "5",
            "Machine Learning Portfolio",
            "Various machine learning projects and implementations",
            "https://images.unsplash.com/photo-1527474305487-b87b222841cc",
            &["Python", "Scikit-learn", "TensorFlow"][..],
            "https://github.com/ctmes/p_ml",
            "AI/ML",
        ),
    ];

    let newest = Utc
        .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);

    entries
        .iter()
        .enumerate()
        .map(|(index, (id, title, description, image, technologies, repo, category))| {
            json!({
                "id": id,
                "title": title,
                "description": description,
                "image_url": image,
                "technologies": technologies,
                "github_url": repo,
                "live_url": repo,
                "category": category,
                "created_at": timestamp(newest - Duration::days(index as i64)),
            })
        })
        .collect()
}

impl Storage {
    /// Inserts the default projects when the table is empty. Returns how many
    /// rows were written.
    pub async fn seed_projects(&self) -> Result<usize> {
        let existing = self
            .select(PROJECTS_TABLE, &RowQuery::new().limit(1))
            .await?;
        if !existing.is_empty() {
            return Ok(0);
        }

        let projects = default_projects();
        let count = projects.len();
        for project in projects {
            self.insert(PROJECTS_TABLE, project).await?;
        }
        info!(count, "seeded default projects");
        Ok(count)
    }
}
