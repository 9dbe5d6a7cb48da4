use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Course {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
}

impl Course {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Course")
    }
}

#[derive(Debug, Deserialize)]
pub struct Assignment {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default = "default_published")]
    pub published: bool,
    #[serde(default)]
    pub submission: Option<Submission>,
}

fn default_published() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub workflow_state: Option<String>,
}

impl Submission {
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
            || matches!(
                self.workflow_state.as_deref(),
                Some("submitted" | "graded" | "pending_review")
            )
    }
}
