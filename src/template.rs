//! Template rendering collaborator.
//!
//! Endpoints return a [`View`] (template name plus JSON model); the pipeline
//! renders it through whatever [`TemplateEngine`] the application installed
//! and writes the result as HTML.

use std::path::Path;

use minijinja::{Environment, path_loader};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{JoltError, JoltResult};

/// A template to render and the model to render it with.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    template: String,
    model: Map<String, Value>,
}

impl View {
    /// A view of `template` with an empty model.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            model: Map::new(),
        }
    }

    /// Adds one model entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> JoltResult<Self> {
        self.model.insert(key.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Name of the template, relative to the engine's root.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The model as a JSON object.
    pub fn model(&self) -> Value {
        Value::Object(self.model.clone())
    }
}

/// Renders a named template against a JSON model.
pub trait TemplateEngine: Send + Sync + 'static {
    fn render(&self, template: &str, model: &Value) -> JoltResult<String>;
}

/// [`TemplateEngine`] backed by `minijinja`, loading templates from a directory.
///
/// Templates are resolved through minijinja's path loader, so `{% include %}`
/// and `{% extends %}` see every file under the root and names containing
/// `..` are never found. A loaded template is cached for the life of the
/// engine. Rendering reads from disk and blocks; the pipeline calls
/// [`TemplateEngine::render`] from a blocking task.
pub struct MiniJinjaTemplates {
    env: Environment<'static>,
}

impl MiniJinjaTemplates {
    /// An engine loading templates from `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(root.as_ref().to_path_buf()));
        Self { env }
    }
}

impl TemplateEngine for MiniJinjaTemplates {
    fn render(&self, template: &str, model: &Value) -> JoltResult<String> {
        let fail = |e: minijinja::Error| JoltError::Template {
            template: template.to_owned(),
            reason: e.to_string(),
        };
        self.env
            .get_template(template)
            .and_then(|tmpl| tmpl.render(model))
            .map_err(fail)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn renders_model_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.html"), "<h1>Hello {{ name }}!</h1>").unwrap();

        let engine = MiniJinjaTemplates::new(dir.path());
        let view = View::new("hello.html").with("name", "World").unwrap();
        let html = engine.render(view.template(), &view.model()).unwrap();
        assert_eq!(html, "<h1>Hello World!</h1>");
    }

    #[test]
    fn missing_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MiniJinjaTemplates::new(dir.path());
        let err = engine.render("nope.html", &Value::Null).unwrap_err();
        assert!(matches!(err, JoltError::Template { ref template, .. } if template == "nope.html"));
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MiniJinjaTemplates::new(dir.path());
        assert!(engine.render("../secret.txt", &Value::Null).is_err());
    }

    #[test]
    fn include_and_extends_resolve_against_the_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("nav.html"), "<nav>{{ title }}</nav>").unwrap();
        fs::write(
            dir.path().join("base.html"),
            "{% include 'nav.html' %}<main>{% block body %}{% endblock %}</main>",
        )
        .unwrap();
        fs::write(
            dir.path().join("page.html"),
            "{% extends 'base.html' %}{% block body %}hi {{ name }}{% endblock %}",
        )
        .unwrap();

        let engine = MiniJinjaTemplates::new(dir.path());
        let view = View::new("page.html")
            .with("title", "Home")
            .unwrap()
            .with("name", "Ada")
            .unwrap();
        let html = engine.render(view.template(), &view.model()).unwrap();
        assert_eq!(html, "<nav>Home</nav><main>hi Ada</main>");
    }
}
