use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Page actions offered on selected text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageAction {
    #[serde(alias = "analisar")]
    Analyze,
    #[serde(alias = "explicar")]
    Explain,
}

impl PageAction {
    fn verb(self) -> &'static str {
        match self {
            PageAction::Analyze => "analyze",
            PageAction::Explain => "explain",
        }
    }
}

impl fmt::Display for PageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for PageAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analyze" | "analyse" | "analisar" => Ok(PageAction::Analyze),
            "explain" | "explicar" => Ok(PageAction::Explain),
            other => Err(format!("Unknown page action: {other}")),
        }
    }
}

/// Where the selected text came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// Build the prefilled chat prompt for `action` on `text`.
pub fn contextual_prompt(action: PageAction, text: &str, context: &PageContext) -> String {
    format!(
        "Please {} the following text from the page \"{}\":\n\n\"{}\"\n\nPage context: {}",
        action.verb(),
        context.title,
        text.trim(),
        context.url
    )
}
