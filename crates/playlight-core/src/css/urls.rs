use std::sync::OnceLock;

use regex::{Captures, Regex};
use url::Url;

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^'")\s]+))\s*\)"#)
            .expect("url pattern is valid")
    })
}

fn is_absolute(reference: &str) -> bool {
    reference.starts_with('#') || reference.starts_with("//") || Url::parse(reference).is_ok()
}

/// Resolve relative `url(...)` references against `base`.
///
/// Absolute URLs, `data:` URIs and fragment references are kept verbatim, as
/// is anything that fails to resolve. The original quoting style is preserved.
#[must_use]
pub fn absolutize_urls(css: &str, base: &Url) -> String {
    url_pattern()
        .replace_all(css, |caps: &Captures<'_>| {
            let (reference, quote) = if let Some(m) = caps.get(1) {
                (m.as_str(), "\"")
            } else if let Some(m) = caps.get(2) {
                (m.as_str(), "'")
            } else if let Some(m) = caps.get(3) {
                (m.as_str(), "")
            } else {
                return caps[0].to_string();
            };
            if reference.is_empty() || is_absolute(reference) {
                return caps[0].to_string();
            }
            match base.join(reference) {
                Ok(resolved) => format!("url({quote}{resolved}{quote})"),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://cdn.example.com/assets/css/main.css").unwrap()
    }

    #[test]
    fn test_relative_resolved() {
        assert_eq!(
            absolutize_urls("a { background: url(img/x.png) }", &base()),
            "a { background: url(https://cdn.example.com/assets/css/img/x.png) }"
        );
        assert_eq!(
            absolutize_urls("a { background: url('/x.png') }", &base()),
            "a { background: url('https://cdn.example.com/x.png') }"
        );
    }

    #[test]
    fn test_absolute_kept() {
        let css = r#"a { b: url("https://other.org/y.png"); c: url(data:image/png;base64,AA==); d: url(#grad); e: url(//cdn.x/z.png) }"#;
        assert_eq!(absolutize_urls(css, &base()), css);
    }

    #[test]
    fn test_empty_kept() {
        assert_eq!(absolutize_urls("a { b: url('') }", &base()), "a { b: url('') }");
    }
}
