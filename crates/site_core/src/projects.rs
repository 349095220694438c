use std::{fmt, sync::Arc};

use backend::{Backend, RowQuery, SortOrder};
use shared::domain::{Project, PROJECTS_TABLE};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Category {
    #[default]
    All,
    Frontend,
    FullStack,
    DataAnalysis,
    AiMl,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::All,
        Category::Frontend,
        Category::FullStack,
        Category::DataAnalysis,
        Category::AiMl,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Frontend => "Frontend",
            Self::FullStack => "Full Stack",
            Self::DataAnalysis => "Data Analysis",
            Self::AiMl => "AI/ML",
        }
    }

    /// Unknown labels fall back to showing everything.
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(label))
            .unwrap_or_default()
    }

    pub fn matches(self, project: &Project) -> bool {
        self == Self::All || project.category == self.label()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn filter_by_category(projects: &[Project], category: Category) -> Vec<Project> {
    projects
        .iter()
        .filter(|project| category.matches(project))
        .cloned()
        .collect()
}

/// `https://github.com/user/repo` becomes `https://github.io/user`: the host
/// is swapped and the final path segment dropped.
pub fn live_demo_url(live_url: &str) -> String {
    let swapped = live_url.replacen("github.com", "github.io", 1);
    match swapped.rfind('/') {
        Some(index) if index + 1 < swapped.len() => swapped[..index].to_string(),
        _ => swapped,
    }
}

pub struct ProjectCatalog {
    backend: Arc<dyn Backend>,
}

impl ProjectCatalog {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Newest first. A failed fetch is logged and reads as an empty catalog.
    pub async fn list(&self) -> Vec<Project> {
        let query = RowQuery::new().order_by("created_at", SortOrder::Descending);
        match self.backend.select(PROJECTS_TABLE, &query).await {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| match serde_json::from_value::<Project>(row) {
                    Ok(project) => Some(project),
                    Err(err) => {
                        warn!(error = %err, "skipping undecodable project");
                        None
                    }
                })
                .collect(),
            Err(err) => {
                warn!(error = %err, "failed to fetch projects");
                Vec::new()
            }
        }
    }

    pub async fn list_in(&self, category: Category) -> Vec<Project> {
        filter_by_category(&self.list().await, category)
    }

    pub async fn get(&self, id: &str) -> Option<Project> {
        match self.backend.select_by_id(PROJECTS_TABLE, id).await {
            Ok(row) => row.and_then(|row| {
                serde_json::from_value(row)
                    .inspect_err(|err| warn!(%id, error = %err, "undecodable project"))
                    .ok()
            }),
            Err(err) => {
                warn!(%id, error = %err, "failed to fetch project");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/projects_tests.rs"]
mod tests;
