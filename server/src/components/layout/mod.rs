use maud::{html, Markup, Render};

pub struct Page {
    pub title: String,
    pub content: Box<dyn Render>,
}

impl Page {
    pub fn new(title: impl Into<String>, content: impl Render + 'static) -> Self {
        Self {
            title: title.into(),
            content: Box::new(content),
        }
    }
}

impl Render for Page {
    fn render(&self) -> Markup {
        html! {
            (maud::DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    title { (self.title) }
                    script src="https://unpkg.com/@tailwindcss/browser@4" {}
                    meta name="viewport" content="width=device-width, initial-scale=1.0";
                }
                body {
                    div class="min-h-screen bg-gradient-to-br from-slate-100 to-blue-50 py-8 px-4" {
                        (self.content.render())

                        div class="mt-8 text-center text-sm text-gray-500" {
                            "Drive Broker - Google Drive access for tool-calling assistants"
                        }
                    }
                }
            }
        }
    }
}

impl axum::response::IntoResponse for Page {
    fn into_response(self) -> axum::response::Response {
        self.render().into_response()
    }
}

pub struct Card {
    pub content: Box<dyn Render>,
    pub max_width: Option<String>,
}

impl Card {
    pub fn new(content: impl Render + 'static) -> Self {
        Self {
            content: Box::new(content),
            max_width: None,
        }
    }

    pub fn with_max_width(mut self, max_width: &str) -> Self {
        self.max_width = Some(max_width.to_string());
        self
    }
}

impl Render for Card {
    fn render(&self) -> Markup {
        let width_class = self.max_width.as_deref().unwrap_or("max-w-md");

        html! {
            div class={(width_class) " mx-auto bg-white rounded-xl border border-gray-100 shadow-lg p-8"} {
                (self.content.render())
            }
        }
    }
}

/// Heading plus a paragraph, the body of every auth result page.
pub struct Notice {
    pub heading: String,
    pub message: String,
    pub tone: Tone,
}

#[derive(Clone, Copy)]
pub enum Tone {
    Success,
    Error,
}

impl Notice {
    pub fn success(heading: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            message: message.into(),
            tone: Tone::Success,
        }
    }

    pub fn error(heading: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            message: message.into(),
            tone: Tone::Error,
        }
    }
}

impl Render for Notice {
    fn render(&self) -> Markup {
        let heading_class = match self.tone {
            Tone::Success => "text-2xl font-bold text-green-700 mb-4",
            Tone::Error => "text-2xl font-bold text-red-700 mb-4",
        };

        html! {
            h1 class=(heading_class) { (self.heading) }
            p class="text-gray-700" { (self.message) }
        }
    }
}
