//! URL path templates for path-based ingress
//!
//! `pathTemplate` in the ingress config uses Go-template style placeholders,
//! e.g. `/serving/{{ .Namespace }}/{{ .Name }}`. Rendering goes through
//! minijinja with strict undefined handling; the leading dot of a field
//! reference is dropped before rendering so both `{{ .Name }}` and
//! `{{ Name }}` work.

use minijinja::{context, Environment, UndefinedBehavior};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::config::IngressConfig;
use crate::Error;

/// A field reference in Go-template form: `.Name`, `.Namespace`
static GO_FIELD_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[\s(,|])\.([A-Za-z_])").expect("field reference pattern is hardcoded and valid")
});

/// Render the configured path template for an inference service.
///
/// # Errors
///
/// Returns `Error::Template` if the template is empty, fails to render, or
/// renders to something that is not an absolute URL path.
pub fn generate_url_path(name: &str, namespace: &str, config: &IngressConfig) -> Result<String, Error> {
    let template = config.path_template.as_str();
    if template.is_empty() {
        return Err(Error::template(template, "no path template configured"));
    }

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    let path = env
        .render_str(
            &normalize_field_references(template),
            context! { Name => name, Namespace => namespace },
        )
        .map_err(|e| Error::template(template, e.to_string()))?;

    if !is_valid_path(&path) {
        return Err(Error::template(template, format!("invalid url path {:?}", path)));
    }
    Ok(path)
}

fn is_valid_path(path: &str) -> bool {
    if !path.starts_with('/') || path.contains('?') || path.contains('#') {
        return false;
    }
    Url::parse(&format!("http://localhost{}", path)).is_ok()
}

/// Drop the leading dot of Go-template field references inside `{{ ... }}`.
///
/// Text outside of expressions is copied untouched.
fn normalize_field_references(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(start) = remaining.find("{{") {
        result.push_str(&remaining[..start + 2]);
        remaining = &remaining[start + 2..];

        match remaining.find("}}") {
            Some(end) => {
                let expression = &remaining[..end];
                result.push_str(&GO_FIELD_REFERENCE.replace_all(expression, "${1}${2}"));
                result.push_str("}}");
                remaining = &remaining[end + 2..];
            }
            None => break,
        }
    }

    result.push_str(remaining);
    result
}
