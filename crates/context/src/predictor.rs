//! Component requirement prediction.
//!
//! Keyword and intent matching over the free-text request. Each app type
//! carries a minimal default component set; phrases in the request add
//! further components. A miss is not an error: the model can still load a
//! component on demand mid-conversation.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Coarse application type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    Todo,
    Dashboard,
    Landing,
    Form,
    Ecommerce,
    Blog,
    Chat,
    Generic,
}

impl AppType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Dashboard => "dashboard",
            Self::Landing => "landing",
            Self::Form => "form",
            Self::Ecommerce => "ecommerce",
            Self::Blog => "blog",
            Self::Chat => "chat",
            Self::Generic => "generic",
        }
    }

    /// Components every app of this type starts with.
    pub fn default_components(self) -> &'static [&'static str] {
        match self {
            Self::Todo => &["input", "checkbox", "button", "card"],
            Self::Dashboard => &["card", "table", "chart", "badge"],
            Self::Landing => &["button", "card", "badge"],
            Self::Form => &["input", "label", "button", "card"],
            Self::Ecommerce => &["card", "button", "badge", "input"],
            Self::Blog => &["card", "badge", "avatar"],
            Self::Chat => &["input", "button", "avatar", "card"],
            Self::Generic => &["button", "card"],
        }
    }
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "dashboard" => Ok(Self::Dashboard),
            "landing" => Ok(Self::Landing),
            "form" => Ok(Self::Form),
            "ecommerce" => Ok(Self::Ecommerce),
            "blog" => Ok(Self::Blog),
            "chat" => Ok(Self::Chat),
            "generic" => Ok(Self::Generic),
            other => Err(format!("unknown app type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub components: Vec<String>,
    pub app_type: AppType,
}

impl Prediction {
    pub fn contains(&self, component: &str) -> bool {
        self.components.iter().any(|c| c == component)
    }
}

// Checked in order; the first match wins.
const APP_TYPE_PATTERNS: &[(AppType, &str)] = &[
    (AppType::Todo, r"\b(todos?|to-dos?|task (list|manager|tracker)|checklist)\b"),
    (AppType::Dashboard, r"\b(dashboard|admin panel|analytics|metrics|kpis?)\b"),
    (AppType::Ecommerce, r"\b(e-?commerce|shop|store ?front|shopping cart|checkout|product catalog)\b"),
    (AppType::Chat, r"\b(chat|messaging|messenger|chatbot)\b"),
    (AppType::Blog, r"\b(blog|articles?|posts?)\b"),
    (AppType::Form, r"\b(form|survey|questionnaire|sign ?up|registration|contact)\b"),
    (AppType::Landing, r"\b(landing|home ?page|marketing|portfolio|waitlist)\b"),
];

const COMPONENT_PATTERNS: &[(&str, &[&str])] = &[
    (r"\b(table|spreadsheet|grid)\b", &["table"]),
    (r"\b(charts?|graphs?|plots?)\b", &["chart"]),
    (r"\b(modal|dialog|popup|pop-up)\b", &["dialog"]),
    (r"\b(dropdown|drop-down|select|picker)\b", &["select"]),
    (r"\btabs?\b", &["tabs"]),
    (r"\b(toggle|switch|dark mode)\b", &["switch"]),
    (r"\b(slider|range)\b", &["slider"]),
    (r"\b(dates?|calendar|schedul\w*|due)\b", &["calendar"]),
    (r"\b(avatars?|profiles?)\b", &["avatar"]),
    (r"\b(toasts?|notifications?|alerts?)\b", &["toast"]),
    (r"\b(progress|loading bar)\b", &["progress"]),
    (r"\b(log ?in|sign ?in|auth\w*)\b", &["input", "label", "button"]),
    (r"\b(tags?|labels?|categor\w*|status)\b", &["badge"]),
];

/// The component requirement predictor. Patterns compile once.
pub struct Predictor {
    app_types: Vec<(AppType, Regex)>,
    components: Vec<(Regex, &'static [&'static str])>,
}

impl Predictor {
    pub fn new() -> Self {
        Self {
            app_types: APP_TYPE_PATTERNS
                .iter()
                .filter_map(|(app_type, pattern)| compile(pattern).map(|re| (*app_type, re)))
                .collect(),
            components: COMPONENT_PATTERNS
                .iter()
                .filter_map(|(pattern, implied)| compile(pattern).map(|re| (re, *implied)))
                .collect(),
        }
    }

    /// Detect the app type of a request, if any pattern matches.
    pub fn detect_app_type(&self, text: &str) -> Option<AppType> {
        self.app_types
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(app_type, _)| *app_type)
    }

    /// Predict which components a request needs.
    ///
    /// An established `current_app_type` (anything but `Generic`) is kept,
    /// so follow-up requests never reclassify the app. Defaults come first,
    /// then keyword additions in table order, without duplicates.
    pub fn predict(&self, request_text: &str, current_app_type: Option<AppType>) -> Prediction {
        let text = request_text.to_lowercase();
        let app_type = current_app_type
            .filter(|t| *t != AppType::Generic)
            .or_else(|| self.detect_app_type(&text))
            .unwrap_or(AppType::Generic);

        let mut components: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !components.iter().any(|c| c == name) {
                components.push(name.to_string());
            }
        };
        for name in app_type.default_components().iter().copied() {
            push(name);
        }
        for (re, implied) in &self.components {
            if re.is_match(&text) {
                for name in implied.iter().copied() {
                    push(name);
                }
            }
        }

        Prediction {
            components,
            app_type,
        }
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Skipping invalid prediction pattern");
            None
        }
    }
}
