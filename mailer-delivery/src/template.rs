//! On-disk templates.
//!
//! A template named `welcome` is the pair of files `welcome.text.template`
//! and `welcome.html.template` in the template directory. Either may be
//! absent, but not both.
//!
//! Templates use Jinja syntax and are rendered with the request parameters
//! as their context, so `{{ name }}` and `{% if name %}..{% endif %}` both
//! see `params["name"]`. Parameter keys are always lowercase. Unknown keys
//! render as nothing. The HTML variant is auto-escaped.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use mailer_common::outgoing;
use minijinja::{AutoEscape, Environment};

use crate::DispatchError;

const HTML_SUFFIX: &str = ".html.template";

/// The two renderings a template can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateVariant {
    Text,
    Html,
}

impl TemplateVariant {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
        }
    }

    /// File name of this variant of template `name`.
    #[must_use]
    pub fn file_name(self, name: &str) -> String {
        format!("{name}.{}.template", self.extension())
    }
}

impl fmt::Display for TemplateVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn environment() -> Environment<'static> {
    let mut environment = Environment::new();
    environment.set_keep_trailing_newline(true);
    environment.set_auto_escape_callback(|name| {
        if name.ends_with(HTML_SUFFIX) {
            AutoEscape::Html
        } else {
            AutoEscape::None
        }
    });
    environment
}

/// Locates templates under a fixed directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    directory: PathBuf,
    environment: Arc<Environment<'static>>,
}

impl TemplateStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            environment: Arc::new(environment()),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Where `variant` of template `name` would live.
    #[must_use]
    pub fn path(&self, name: &str, variant: TemplateVariant) -> PathBuf {
        self.directory.join(variant.file_name(name))
    }

    /// Find the variants of `name` that exist on disk.
    ///
    /// # Errors
    /// [`DispatchError::TemplateMissing`] if neither variant exists, or the
    /// name would escape the template directory
    pub async fn resolve(&self, name: &str) -> Result<ResolvedTemplate, DispatchError> {
        if !is_plain_name(name) {
            return Err(DispatchError::TemplateMissing(name.to_string()));
        }

        let text = self.existing(name, TemplateVariant::Text).await;
        let html = self.existing(name, TemplateVariant::Html).await;

        if text.is_none() && html.is_none() {
            return Err(DispatchError::TemplateMissing(name.to_string()));
        }

        Ok(ResolvedTemplate {
            name: name.to_string(),
            text,
            html,
            environment: Arc::clone(&self.environment),
        })
    }

    async fn existing(&self, name: &str, variant: TemplateVariant) -> Option<PathBuf> {
        let path = self.path(name, variant);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Some(path),
            _ => None,
        }
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

/// A template with at least one variant on disk.
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    name: String,
    text: Option<PathBuf>,
    html: Option<PathBuf>,
    environment: Arc<Environment<'static>>,
}

impl ResolvedTemplate {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn has(&self, variant: TemplateVariant) -> bool {
        match variant {
            TemplateVariant::Text => self.text.is_some(),
            TemplateVariant::Html => self.html.is_some(),
        }
    }

    /// Render every available variant against `params`.
    ///
    /// # Errors
    /// [`DispatchError::TemplateRead`] if a variant could not be read, or
    /// [`DispatchError::Render`] if it is not a valid template
    pub async fn render(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<RenderedBodies, DispatchError> {
        Ok(RenderedBodies {
            text: self.render_variant(TemplateVariant::Text, params).await?,
            html: self.render_variant(TemplateVariant::Html, params).await?,
        })
    }

    async fn render_variant(
        &self,
        variant: TemplateVariant,
        params: &BTreeMap<String, String>,
    ) -> Result<Option<String>, DispatchError> {
        let path = match variant {
            TemplateVariant::Text => self.text.as_ref(),
            TemplateVariant::Html => self.html.as_ref(),
        };

        let Some(path) = path else {
            return Ok(None);
        };

        let source =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| DispatchError::TemplateRead {
                    template: self.name.clone(),
                    variant,
                    source,
                })?;

        outgoing!(
            template = %self.name,
            variant = %variant,
            "Rendering {}",
            path.display()
        );

        self.environment
            .render_named_str(&variant.file_name(&self.name), &source, params)
            .map(Some)
            .map_err(|source| DispatchError::Render {
                template: self.name.clone(),
                variant,
                source,
            })
    }
}

/// Rendered message bodies. At least one is present when produced by
/// [`ResolvedTemplate::render`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedBodies {
    pub text: Option<String>,
    pub html: Option<String>,
}
