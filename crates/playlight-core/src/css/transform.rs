use std::sync::OnceLock;

use regex::{Captures, Regex};
use url::Url;

use super::scan::{find_top_level, matching_brace, split_top_level_commas};
use super::urls::absolutize_urls;
use super::{wrapper_selector, TransformParams};

/// Options that stay fixed for the lifetime of one managed stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Selector substituted for `body`.
    pub wrapper_selector: String,
    /// Location of the original sheet, for converted link sheets.
    pub base_url: Option<Url>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            wrapper_selector: wrapper_selector(),
            base_url: None,
        }
    }
}

impl TransformOptions {
    /// Options for a sheet that used to live at `href`.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<Url>) -> Self {
        self.base_url = base_url;
        self
    }
}

fn viewport_unit_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d*\.?\d+)((?:s|l|d)?vw)\b").expect("viewport unit pattern is valid")
    })
}

fn legacy_width_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\(\s*(?:min-|max-)?width\s*:\s*)(\d*\.?\d+)(px\s*\))")
            .expect("legacy width pattern is valid")
    })
}

fn range_width_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(\d*\.?\d+)(px\s*[<>]=?\s*width\s*[<>]=?\s*)(\d*\.?\d+)px",
            r"|((?:device-)?width\s*(?:[<>]=?|=)\s*)(\d*\.?\d+)px",
            r"|(\d*\.?\d+)(px\s*(?:[<>]=?|=)\s*width)",
        ))
        .expect("range width pattern is valid")
    })
}

fn portrait_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\(\s*orientation\s*:\s*portrait\s*\)").expect("portrait pattern is valid")
    })
}

fn landscape_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\(\s*orientation\s*:\s*landscape\s*\)")
            .expect("landscape pattern is valid")
    })
}

fn important_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*!\s*important").expect("important pattern is valid"))
}

/// Format a length the way CSS serializers do: at most two decimals, no
/// trailing zeros.
#[must_use]
pub fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        let text = format!("{rounded:.2}");
        text.trim_end_matches('0').to_string()
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Scale every viewport-width length by `ratio`, two decimals.
#[must_use]
pub fn scale_viewport_units(text: &str, ratio: f64) -> String {
    let bytes = text.as_bytes();
    viewport_unit_pattern()
        .replace_all(text, |caps: &Captures<'_>| {
            let whole = &caps[0];
            let start = caps.get(0).map_or(0, |m| m.start());
            // Part of an identifier such as `--gap5vw` or `h1vw`.
            let glued = start > 0
                && matches!(bytes[start - 1], b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'#' | b'\\');
            match parse_number(&caps[1]) {
                Some(value) if !glued => format!("{:.2}{}", value * ratio, &caps[2]),
                _ => whole.to_string(),
            }
        })
        .into_owned()
}

fn shift(text: &str, by: f64) -> Option<String> {
    parse_number(text).map(|v| format_number(v + by))
}

/// Add `sidebar_width` to every absolute min/max-width threshold.
///
/// Handles `(min-width: Npx)`, `(width >= Npx)`, `(Npx <= width)` and
/// `(Apx <= width <= Bpx)`. Thresholds in relative units are left alone.
#[must_use]
pub fn rewrite_breakpoints(query: &str, sidebar_width: f64) -> String {
    let legacy = legacy_width_pattern().replace_all(query, |caps: &Captures<'_>| {
        match shift(&caps[2], sidebar_width) {
            Some(value) => format!("{}{}{}", &caps[1], value, &caps[3]),
            None => caps[0].to_string(),
        }
    });

    range_width_pattern()
        .replace_all(&legacy, |caps: &Captures<'_>| {
            if let (Some(low), Some(middle), Some(high)) = (caps.get(1), caps.get(2), caps.get(3)) {
                return match (shift(low.as_str(), sidebar_width), shift(high.as_str(), sidebar_width))
                {
                    (Some(low), Some(high)) => format!("{low}{}{high}px", middle.as_str()),
                    _ => caps[0].to_string(),
                };
            }
            if let (Some(prefix), Some(value)) = (caps.get(4), caps.get(5)) {
                if prefix.as_str().to_ascii_lowercase().starts_with("device-") {
                    return caps[0].to_string();
                }
                return match shift(value.as_str(), sidebar_width) {
                    Some(value) => format!("{}{value}px", prefix.as_str()),
                    None => caps[0].to_string(),
                };
            }
            if let (Some(value), Some(suffix)) = (caps.get(6), caps.get(7)) {
                return match shift(value.as_str(), sidebar_width) {
                    Some(value) => format!("{value}{}", suffix.as_str()),
                    None => caps[0].to_string(),
                };
            }
            caps[0].to_string()
        })
        .into_owned()
}

/// Replace orientation features with equivalent width features.
#[must_use]
pub fn rewrite_orientation(query: &str, params: &TransformParams) -> String {
    let breakpoint = params.orientation_breakpoint();
    let portrait = format!("(max-width: {}px)", format_number(breakpoint));
    let landscape = format!("(min-width: {}px)", format_number(breakpoint + 1.0));
    let query = portrait_pattern().replace_all(query, portrait.as_str());
    landscape_pattern()
        .replace_all(&query, landscape.as_str())
        .into_owned()
}

/// Rewrite a media query string (as passed to `matchMedia`).
#[must_use]
pub fn transform_media_query(query: &str, params: &TransformParams) -> String {
    let shifted = rewrite_breakpoints(query, params.sidebar_width);
    rewrite_orientation(&shifted, params)
}

/// Whether every selector in the list targets the root element itself.
#[must_use]
pub fn selector_targets_root(selector: &str) -> bool {
    let parts = split_top_level_commas(selector);
    let mut seen = false;
    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !is_root_compound(part) {
            return false;
        }
        seen = true;
    }
    seen
}

fn is_root_compound(part: &str) -> bool {
    let lower = part.to_ascii_lowercase();
    let anchored = lower.starts_with(":root")
        || (lower.starts_with("html")
            && lower[4..]
                .chars()
                .next()
                .map_or(true, |c| matches!(c, '.' | '#' | '[' | ':')));
    anchored && find_top_level(part, b" \t\n\r>+~").is_none()
}

fn is_selector_boundary_before(c: Option<char>) -> bool {
    c.map_or(true, |c| c.is_whitespace() || matches!(c, ',' | '>' | '+' | '~' | '('))
}

fn is_selector_boundary_after(c: Option<char>) -> bool {
    c.map_or(true, |c| {
        c.is_whitespace() || matches!(c, ',' | '>' | '+' | '~' | '.' | '#' | '[' | ':' | ')' | '{')
    })
}

/// Replace `body` type selectors with `replacement`.
///
/// Returns the rewritten selector and whether anything changed. Class, id and
/// attribute values that merely contain the word are left alone.
#[must_use]
pub fn rewrite_body_selector(selector: &str, replacement: &str) -> (String, bool) {
    let lower = selector.to_ascii_lowercase();
    let mut out = String::with_capacity(selector.len() + replacement.len());
    let mut changed = false;
    let mut cursor = 0;
    let mut search = 0;
    while let Some(found) = lower[search..].find("body") {
        let start = search + found;
        let end = start + 4;
        let before = selector[..start].chars().next_back();
        let after = selector[end..].chars().next();
        if is_selector_boundary_before(before) && is_selector_boundary_after(after) {
            out.push_str(&selector[cursor..start]);
            out.push_str(replacement);
            cursor = end;
            changed = true;
        }
        search = end;
    }
    out.push_str(&selector[cursor..]);
    (out, changed)
}

/// Remove `!important` flags from a declaration block.
#[must_use]
pub fn strip_important(declarations: &str) -> String {
    important_pattern().replace_all(declarations, "").into_owned()
}

struct Pass<'a> {
    params: &'a TransformParams,
    options: &'a TransformOptions,
}

impl Pass<'_> {
    fn rule_list(&self, css: &str, out: &mut String) {
        let mut rest = css;
        while !rest.is_empty() {
            let Some((idx, delim)) = find_top_level(rest, b"{;}") else {
                out.push_str(rest);
                return;
            };
            if delim != b'{' {
                out.push_str(&rest[..=idx]);
                rest = &rest[idx + 1..];
                continue;
            }
            let Some(close) = matching_brace(rest, idx) else {
                // Unbalanced: pass the remainder through untouched.
                out.push_str(rest);
                return;
            };
            self.rule(&rest[..idx], &rest[idx + 1..close], out);
            rest = &rest[close + 1..];
        }
    }

    fn rule(&self, prelude: &str, block: &str, out: &mut String) {
        let trimmed = prelude.trim_start();
        if let Some(at_rule) = trimmed.strip_prefix('@') {
            let name: String = at_rule
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect::<String>()
                .to_ascii_lowercase();
            match name.as_str() {
                "media" => {
                    out.push_str(&transform_media_query(prelude, self.params));
                    self.nested(block, out);
                }
                "supports" | "layer" | "container" | "document" | "-moz-document" | "scope"
                | "starting-style" | "keyframes" | "-webkit-keyframes" | "-moz-keyframes" => {
                    out.push_str(prelude);
                    self.nested(block, out);
                }
                _ => {
                    out.push_str(prelude);
                    out.push('{');
                    out.push_str(block);
                    out.push('}');
                }
            }
            return;
        }

        let anchored = selector_targets_root(prelude);
        let (selector, retargeted) = rewrite_body_selector(prelude, &self.options.wrapper_selector);
        let mut declarations = if anchored {
            block.to_string()
        } else {
            scale_viewport_units(block, self.params.viewport_ratio())
        };
        if retargeted {
            declarations = strip_important(&declarations);
        }
        out.push_str(&selector);
        out.push('{');
        out.push_str(&declarations);
        out.push('}');
    }

    fn nested(&self, block: &str, out: &mut String) {
        out.push('{');
        self.rule_list(block, out);
        out.push('}');
    }
}

/// Rewrite a whole stylesheet for the current geometry.
///
/// `css` must be the pristine source; the result is never fed back in, so
/// repeated passes cannot compound.
#[must_use]
pub fn transform_stylesheet(css: &str, params: &TransformParams, options: &TransformOptions) -> String {
    let source = match &options.base_url {
        Some(base) => absolutize_urls(css, base),
        None => css.to_string(),
    };
    let mut out = String::with_capacity(source.len() + source.len() / 8);
    Pass { params, options }.rule_list(&source, &mut out);
    out
}
