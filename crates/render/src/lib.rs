//! Script and site template rendering.
//!
//! Thin wrapper around handlebars in strict mode: rendering a template that
//! references an unknown variable fails with a typed [`NbforgeError::Render`]
//! naming the variable, and context creation for the affected job aborts —
//! there is no partial retry.
//!
//! Default templates ship embedded in the binary; a configured template
//! directory overrides them per file.

use std::path::Path;

use chrono::{DateTime, Utc};
use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use nbforge_shared::{NbforgeError, Result, SiteConfig};

/// Template names known to the pipeline, with their embedded defaults.
const DEFAULT_TEMPLATES: [(&str, &str); 4] = [
    (
        "setup-build-env.sh",
        include_str!("../templates/setup-build-env.sh.hbs"),
    ),
    ("build.sh", include_str!("../templates/build.sh.hbs")),
    ("index.html", include_str!("../templates/index.html.hbs")),
    ("notebook.html", include_str!("../templates/notebook.html.hbs")),
];

// ---------------------------------------------------------------------------
// Date helpers (registered on every renderer)
// ---------------------------------------------------------------------------

handlebars_helper!(human_date: |v: str| format_datetime(v, "%A, %d. %B %Y %I:%M%p"));
handlebars_helper!(machine_date: |v: str| format_datetime(v, "%Y-%m-%d"));
handlebars_helper!(machine_date_with_time: |v: str| format_datetime(v, "%Y-%m-%dT%H-%M-%S"));

fn format_datetime(raw: &str, format: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.format(format).to_string(),
        Err(_) => raw.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Template rendering service: `render(template_name, context) -> text`.
pub struct Renderer {
    registry: Handlebars<'static>,
    site: SiteConfig,
}

impl Renderer {
    /// Create a renderer with the embedded defaults, optionally overridden by
    /// `*.hbs` files in `template_dir` (registered under their file stem, so
    /// `build.sh.hbs` overrides the `build.sh` template).
    pub fn new(template_dir: Option<&Path>, site: &SiteConfig) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_helper("human_date", Box::new(human_date));
        registry.register_helper("machine_date", Box::new(machine_date));
        registry.register_helper("machine_date_with_time", Box::new(machine_date_with_time));

        for (name, source) in DEFAULT_TEMPLATES {
            registry
                .register_template_string(name, source)
                .map_err(|e| NbforgeError::render(format!("invalid template {name}: {e}")))?;
        }

        if let Some(dir) = template_dir {
            register_overrides(&mut registry, dir)?;
        }

        Ok(Self {
            registry,
            site: site.clone(),
        })
    }

    /// Render a template by name with the given context.
    ///
    /// The context must serialize to a JSON object; an `environment` value
    /// (site metadata plus the current timestamp) is injected into it before
    /// rendering, mirroring what every shipped template expects.
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        let mut value = serde_json::to_value(context)
            .map_err(|e| NbforgeError::render(format!("unserializable context: {e}")))?;

        let Some(object) = value.as_object_mut() else {
            return Err(NbforgeError::render(
                "template context must be a JSON object",
            ));
        };
        object.insert("environment".into(), self.environment());

        self.registry
            .render(template_name, &value)
            .map_err(|e| NbforgeError::render(format!("{template_name}: {e}")))
    }

    /// Site metadata made available to every template as `environment`.
    fn environment(&self) -> Value {
        serde_json::json!({
            "title": self.site.title,
            "description": self.site.description,
            "keywords": self.site.keywords.join(","),
            "author": self.site.author,
            "maintainer": self.site.maintainer,
            "locale": self.site.locale,
            "base_url": self.site.base_url,
            "today": Utc::now().to_rfc3339(),
        })
    }
}

/// Register every `*.hbs` file in `dir` under its file stem.
fn register_overrides(registry: &mut Handlebars<'static>, dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| NbforgeError::io(dir, e))?;
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("hbs") {
            continue;
        }

        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        debug!(template = name, path = %path.display(), "registering template override");
        registry
            .register_template_file(name, &path)
            .map_err(|e| NbforgeError::render(format!("invalid template {name}: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use nbforge_shared::BuildContext;

    fn site() -> SiteConfig {
        SiteConfig {
            title: "Test Site".into(),
            description: "A test site".into(),
            keywords: vec!["one".into(), "two".into()],
            author: "Author".into(),
            maintainer: "Maintainer".into(),
            locale: "en_US".into(),
            base_url: "https://example.org".into(),
        }
    }

    #[test]
    fn renders_setup_script_with_build_context() {
        let renderer = Renderer::new(None, &site()).unwrap();
        let build_context = BuildContext {
            build_dir: PathBuf::from("/tmp/nbforge/build/coll/cat"),
            output_format: "html".into(),
            timeout: 600,
        };

        let script = renderer
            .render(
                "setup-build-env.sh",
                &serde_json::json!({ "build_context": build_context }),
            )
            .unwrap();

        assert!(script.contains("cd \"/tmp/nbforge/build/coll/cat\""));
        assert!(script.contains("requirements.txt"));
    }

    #[test]
    fn missing_variable_is_a_render_error_naming_it() {
        let renderer = Renderer::new(None, &site()).unwrap();

        // build.sh needs both contexts; give it only one.
        let err = renderer
            .render("build.sh", &serde_json::json!({ "build_context": {} }))
            .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("render error"), "got: {message}");
        assert!(message.contains("build_dir") || message.contains("build_context"));
    }

    #[test]
    fn unknown_template_is_a_render_error() {
        let renderer = Renderer::new(None, &site()).unwrap();
        let err = renderer
            .render("nope.html", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, NbforgeError::Render { .. }));
    }

    #[test]
    fn template_dir_overrides_embedded_default() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("build.sh.hbs"),
            "custom {{build_context.output_format}}\n",
        )
        .unwrap();

        let renderer = Renderer::new(Some(tmp.path()), &site()).unwrap();
        let script = renderer
            .render(
                "build.sh",
                &serde_json::json!({ "build_context": { "output_format": "html" } }),
            )
            .unwrap();
        assert_eq!(script, "custom html\n");
    }

    #[test]
    fn environment_is_injected_into_context() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("probe.hbs"),
            "{{environment.title}}|{{environment.keywords}}|{{machine_date environment.today}}",
        )
        .unwrap();

        let renderer = Renderer::new(Some(tmp.path()), &site()).unwrap();
        let out = renderer.render("probe", &serde_json::json!({})).unwrap();
        let parts: Vec<_> = out.split('|').collect();
        assert_eq!(parts[0], "Test Site");
        assert_eq!(parts[1], "one,two");
        // machine_date yields YYYY-MM-DD
        assert_eq!(parts[2].len(), 10);
    }

    #[test]
    fn non_object_context_is_rejected() {
        let renderer = Renderer::new(None, &site()).unwrap();
        let err = renderer.render("index.html", &42).unwrap_err();
        assert!(matches!(err, NbforgeError::Render { .. }));
    }
}
