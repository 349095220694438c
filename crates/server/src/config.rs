use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;

const SETTINGS_FILE: &str = "portfolio.toml";

/// Details about the site's owner shown across the pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerProfile {
    pub name: String,
    pub initials: String,
    pub headline: String,
    pub hero_image: String,
    pub email: String,
    pub github: String,
    pub linkedin: String,
    pub leetcode: String,
    pub location: String,
    pub availability: String,
    pub bio: Vec<String>,
    pub skills: Vec<String>,
    pub languages: Vec<String>,
    pub certifications: Vec<String>,
}

impl Default for OwnerProfile {
    fn default() -> Self {
        Self {
            name: "Colin Melville".into(),
            initials: "CM".into(),
            headline: "Advanced Computer Science (Hons; Spec: AI) student at ANU passionate about data analytics and innovative software solutions".into(),
            hero_image: "https://images.unsplash.com/photo-1517694712202-14dd9538aa97".into(),
            email: "colintmelville@gmail.com".into(),
            github: "https://github.com/ctmes".into(),
            linkedin: "https://www.linkedin.com/in/colin-melville-570383245".into(),
            leetcode: "https://leetcode.com/u/colintmelville/".into(),
            location: "Canberra, Australia".into(),
            availability: "Available for remote opportunities worldwide".into(),
            bio: vec![
                "I'm a Bachelor of Advanced Computer Science (Honours) student at the Australian National University's College of Engineering, Computing & Cybernetics, maintaining a strong academic record with a GPA of 5.4 (77% WAM). My academic journey has focused on combining traditional computer science with cutting-edge fields like Natural Language Processing and Machine Learning.".into(),
                "Through internships at Sharperlight and Tritanium, I've gained practical experience in database management, pricing systems, and international web development. I've also completed virtual internships with KPMG AU in Data Analytics and JPMorgan Chase's Corporate Analyst Development Program, where I developed skills in data analysis, visualization, and business process optimization.".into(),
                "Currently serving as the IT Director for the Financial Management Association of Australia at ANU, I lead the development and implementation of nationwide IT infrastructure while fostering relationships with other university clubs.".into(),
            ],
            skills: [
                "Python",
                "Java",
                "JavaScript",
                "HTML",
                "Data Analysis",
                "Machine Learning",
                "Natural Language Processing",
                "Excel",
                "PowerPoint",
                "SciPy",
                "Pandas",
                "Tableau",
            ]
            .map(String::from)
            .to_vec(),
            languages: ["English", "Japanese (Conversational)", "Chinese (Basic)"]
                .map(String::from)
                .to_vec(),
            certifications: [
                "Hanyu Shuiping Kaoshi (Chinese Proficiency Test) Level 3",
                "Akunacademy Options 101",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub backend_url: Option<String>,
    pub backend_anon_key: Option<String>,
    pub auth_secret: Option<String>,
    pub auth_token_ttl_seconds: i64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub seed_projects: bool,
    pub resume_bucket: String,
    pub cookie_secure: bool,
    pub max_form_bytes: usize,
    pub owner: OwnerProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/portfolio.db".into(),
            backend_url: None,
            backend_anon_key: None,
            auth_secret: None,
            auth_token_ttl_seconds: 3600,
            admin_email: None,
            admin_password: None,
            seed_projects: true,
            resume_bucket: shared::domain::RESUME_BUCKET.into(),
            cookie_secure: false,
            max_form_bytes: 64 * 1024,
            owner: OwnerProfile::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMode {
    Hosted { url: String, anon_key: String },
    Local { database_url: String },
}

impl Settings {
    /// Hosted when both the project URL and anon key are set, local otherwise.
    pub fn backend_mode(&self) -> BackendMode {
        let url = self.backend_url.as_deref().map(str::trim).filter(|v| !v.is_empty());
        let key = self
            .backend_anon_key
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        match (url, key) {
            (Some(url), Some(anon_key)) => BackendMode::Hosted {
                url: url.to_string(),
                anon_key: anon_key.to_string(),
            },
            _ => BackendMode::Local {
                database_url: self.database_url.clone(),
            },
        }
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then `portfolio.toml` (flat string keys), then the environment.
pub fn load_settings_from(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            apply(&mut settings, |key| file_cfg.get(key).cloned());
        }
    }

    apply(&mut settings, |key| {
        env(&format!("PORTFOLIO__{}", key.to_ascii_uppercase()))
    });

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    for key in ["SUPABASE_URL", "VITE_SUPABASE_URL"] {
        if let Some(v) = env(key) {
            settings.backend_url = Some(v);
        }
    }
    for key in ["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"] {
        if let Some(v) = env(key) {
            settings.backend_anon_key = Some(v);
        }
    }

    settings
}

fn apply(settings: &mut Settings, get: impl Fn(&str) -> Option<String>) {
    if let Some(v) = get("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = get("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = get("backend_url") {
        settings.backend_url = Some(v);
    }
    if let Some(v) = get("backend_anon_key") {
        settings.backend_anon_key = Some(v);
    }
    if let Some(v) = get("auth_secret") {
        settings.auth_secret = Some(v);
    }
    if let Some(parsed) = get("auth_token_ttl_seconds").and_then(|v| v.parse().ok()) {
        settings.auth_token_ttl_seconds = parsed;
    }
    if let Some(v) = get("admin_email") {
        settings.admin_email = Some(v);
    }
    if let Some(v) = get("admin_password") {
        settings.admin_password = Some(v);
    }
    if let Some(parsed) = get("seed_projects").and_then(|v| parse_flag(&v)) {
        settings.seed_projects = parsed;
    }
    if let Some(v) = get("resume_bucket") {
        settings.resume_bucket = v;
    }
    if let Some(parsed) = get("cookie_secure").and_then(|v| parse_flag(&v)) {
        settings.cookie_secure = parsed;
    }
    if let Some(parsed) = get("max_form_bytes").and_then(|v| v.parse().ok()) {
        settings.max_form_bytes = parsed;
    }

    let owner = &mut settings.owner;
    for (key, field) in [
        ("owner_name", &mut owner.name),
        ("owner_initials", &mut owner.initials),
        ("owner_headline", &mut owner.headline),
        ("owner_hero_image", &mut owner.hero_image),
        ("owner_email", &mut owner.email),
        ("owner_github", &mut owner.github),
        ("owner_linkedin", &mut owner.linkedin),
        ("owner_leetcode", &mut owner.leetcode),
        ("owner_location", &mut owner.location),
    ] {
        if let Some(v) = get(key) {
            *field = v;
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
