//! HTML pages, rendered with minijinja.
//!
//! Templates are compiled into the binary and checked once at startup.

use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;

use crate::{
    sweep::{RetentionPolicy, ThresholdForm},
    twitter::Profile,
};

const SOURCES: [(&str, &str); 4] = [
    ("base.html", include_str!("../../templates/base.html")),
    ("index.html", include_str!("../../templates/index.html")),
    ("confirm.html", include_str!("../../templates/confirm.html")),
    ("error.html", include_str!("../../templates/error.html")),
];

/// Failed to load or render a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("could not compile template {template:?}")]
    Compile {
        template: &'static str,
        #[source]
        source: minijinja::Error,
    },

    #[error("could not render template {template:?}")]
    Render {
        template: &'static str,
        #[source]
        source: minijinja::Error,
    },
}

/// The threshold form, optionally with a banner and per-field errors.
#[derive(Debug, Clone, Default)]
pub struct IndexContext {
    form: ThresholdForm,
    errors: BTreeMap<&'static str, String>,
    notice: Option<String>,
}

impl IndexContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep what the user typed.
    pub fn with_form(mut self, form: ThresholdForm) -> Self {
        self.form = form;
        self
    }

    pub fn with_errors(mut self, errors: BTreeMap<&'static str, String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    fn to_value(&self) -> Value {
        let fields = [
            self.field("minLikes", "Minimum likes", &self.form.min_likes),
            self.field("minRetweets", "Minimum retweets", &self.form.min_retweets),
            self.field("minAge", "Minimum age (days)", &self.form.min_age),
        ];

        let include_replies = matches!(
            self.form.include_replies.as_deref(),
            Some(v) if v.eq_ignore_ascii_case("on") || v.eq_ignore_ascii_case("true")
        );

        minijinja::context! {
            fields => Value::from_serialize(&fields),
            include_replies => include_replies,
            include_replies_error => self.errors.get("includeReplies"),
            notice => self.notice.as_deref(),
        }
    }

    fn field<'a>(&'a self, name: &'static str, label: &'static str, value: &'a str) -> Field<'a> {
        Field {
            name,
            label,
            value,
            error: self.errors.get(name).map(String::as_str),
        }
    }
}

#[derive(Serialize)]
struct Field<'a> {
    name: &'static str,
    label: &'static str,
    value: &'a str,
    error: Option<&'a str>,
}

/// The confirmation page shown after sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmContext {
    pub profile: Profile,
    pub policy: RetentionPolicy,
    pub dry_run: bool,
}

/// A full-page error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub title: String,
    pub message: String,
}

/// Compiled templates.
#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn load() -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        for (name, source) in SOURCES {
            env.add_template(name, source)
                .map_err(|source| TemplateError::Compile {
                    template: name,
                    source,
                })?;
        }

        Ok(Self { env })
    }

    fn render(&self, template: &'static str, ctx: Value) -> Result<String, TemplateError> {
        self.env
            .get_template(template)
            .and_then(|t| t.render(ctx))
            .map_err(|source| TemplateError::Render { template, source })
    }

    pub fn render_index(&self, context: &IndexContext) -> Result<String, TemplateError> {
        self.render("index.html", context.to_value())
    }

    pub fn render_confirm(&self, context: &ConfirmContext) -> Result<String, TemplateError> {
        self.render("confirm.html", Value::from_serialize(context))
    }

    pub fn render_error(&self, context: &ErrorContext) -> Result<String, TemplateError> {
        self.render("error.html", Value::from_serialize(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates() -> Templates {
        Templates::load().unwrap()
    }

    #[test]
    fn test_index_renders_empty_form() {
        let html = templates().render_index(&IndexContext::new()).unwrap();

        assert!(html.contains(r#"action="/connect""#));
        assert!(html.contains(r#"name="minLikes""#));
        assert!(html.contains(r#"name="minRetweets""#));
        assert!(html.contains(r#"name="minAge""#));
        assert!(html.contains(r#"name="includeReplies""#));
        assert!(!html.contains("field-error"));
        assert!(!html.contains(" checked"));
    }

    #[test]
    fn test_index_renders_errors_and_keeps_input() {
        let form = ThresholdForm {
            min_likes: "-3".into(),
            min_retweets: "2".into(),
            min_age: "<b>".into(),
            include_replies: Some("on".into()),
        };
        let errors = BTreeMap::from([
            ("minLikes", "must be zero or greater".to_string()),
            ("minAge", "must be a whole number".to_string()),
        ]);

        let html = templates()
            .render_index(&IndexContext::new().with_form(form).with_errors(errors))
            .unwrap();

        assert!(html.contains("Minimum likes must be zero or greater"));
        assert!(html.contains("Minimum age (days) must be a whole number"));
        assert!(html.contains(r#"value="-3""#));
        assert!(html.contains("&lt;b&gt;"), "input must be escaped");
        assert!(html.contains(" checked"));
    }

    #[test]
    fn test_index_renders_notice() {
        let html = templates()
            .render_index(&IndexContext::new().with_notice("Sign-in was cancelled."))
            .unwrap();
        assert!(html.contains("Sign-in was cancelled."));
    }

    #[test]
    fn test_confirm_renders_profile_and_policy() {
        let html = templates()
            .render_confirm(&ConfirmContext {
                profile: Profile {
                    id: "42".into(),
                    screen_name: "someone".into(),
                    name: "Some One".into(),
                    profile_image_url: Some("https://pbs.twimg.com/a.png".into()),
                },
                policy: RetentionPolicy {
                    min_likes: 5,
                    min_retweets: 3,
                    min_age_days: 30,
                    include_replies: true,
                },
                dry_run: false,
            })
            .unwrap();

        assert!(html.contains("@someone"));
        assert!(html.contains("https://pbs.twimg.com/a.png"));
        assert!(html.contains("<strong>5</strong> likes"));
        assert!(html.contains("<strong>3</strong> retweets"));
        assert!(html.contains("<strong>30</strong> days old"));
        assert!(html.contains("included"));
        assert!(html.contains(r#"id="confirm-button""#));
        assert!(html.contains("/static/js/confirm.js"));
    }

    #[test]
    fn test_error_page() {
        let html = templates()
            .render_error(&ErrorContext {
                title: "Sign-in failed".into(),
                message: "The provider rejected the request.".into(),
            })
            .unwrap();
        assert!(html.contains("Sign-in failed"));
        assert!(html.contains("The provider rejected the request."));
    }
}
