//! Stylesheet interception.
//!
//! Host stylesheets are taken over once and re-derived from their pristine
//! text on every refresh. Linked sheets are swapped for inline `<style>`
//! nodes so later refreshes are plain text writes; deactivation swaps the
//! original nodes back.

use std::collections::HashSet;

use tracing::{debug, warn};
use url::Url;

use crate::css::{transform_stylesheet, TransformOptions, TransformParams};
use crate::error::StyleError;

/// Attribute marking the SDK's own inline stylesheet.
pub const SDK_STYLE_ATTRIBUTE: &str = "data-playlight-sdk";

/// Where a stylesheet's text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    /// `<style>` element.
    Inline,
    /// `<link rel="stylesheet">` element.
    Link,
}

/// One entry of the document's stylesheet list.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetSnapshot<N> {
    /// Owner element.
    pub owner: N,
    /// Absolute location, for linked sheets.
    pub href: Option<String>,
    /// Owner kind.
    pub kind: SheetKind,
    /// Carries the SDK marker attribute.
    pub marked_sdk: bool,
    /// Sheet text, or why it could not be read.
    pub text: Result<String, StyleError>,
}

impl<N> SheetSnapshot<N> {
    /// Whether the sheet belongs to the SDK and must never be rewritten.
    #[must_use]
    pub fn is_sdk_owned(&self) -> bool {
        self.marked_sdk
            || self
                .href
                .as_deref()
                .is_some_and(|href| href.to_ascii_lowercase().contains("playlight"))
    }
}

/// Platform access to stylesheets.
pub trait StyleHost {
    /// Handle to a stylesheet owner element.
    type Node: Clone + PartialEq + std::fmt::Debug;

    /// Every stylesheet currently applied to the document, in order.
    fn stylesheets(&self) -> Vec<SheetSnapshot<Self::Node>>;
    /// Replace a `<link>` with a `<style>` holding `css`; returns the new node.
    fn replace_link(&self, link: &Self::Node, css: &str) -> Result<Self::Node, StyleError>;
    /// Current text of a `<style>` node.
    fn style_text(&self, style: &Self::Node) -> Option<String>;
    /// Overwrite the text of a `<style>` node.
    fn set_style_text(&self, style: &Self::Node, css: &str) -> Result<(), StyleError>;
    /// Put `link` back where `style` is.
    fn restore_link(&self, style: &Self::Node, link: &Self::Node) -> Result<(), StyleError>;
    /// Whether the node is still part of the document.
    fn is_attached(&self, node: &Self::Node) -> bool;
    /// Serialized rules of a `<style>` node as the platform currently holds
    /// them. Rules inserted through the object model show up here but not
    /// in [`StyleHost::style_text`].
    fn live_rules(&self, _style: &Self::Node) -> Option<Vec<String>> {
        None
    }
}

/// A stylesheet under SDK control.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedStylesheet<N> {
    /// `<style>` node carrying the transformed text.
    pub node: N,
    /// Pristine source text.
    pub original_css: String,
    /// The `<link>` the node replaced, if any.
    pub original_link: Option<N>,
    options: TransformOptions,
    written: Option<String>,
    written_rules: Vec<String>,
}

impl<N> ManagedStylesheet<N> {
    /// Fold host changes made since the last write into the pristine text.
    fn sync_from_host<H: StyleHost<Node = N>>(&mut self, host: &H) {
        let Some(written) = self.written.as_ref() else {
            return;
        };
        if let Some(current) = host.style_text(&self.node) {
            if current != *written {
                // Edited by the host since the last pass.
                self.original_css = current;
                return;
            }
        }
        let Some(live) = host.live_rules(&self.node) else {
            return;
        };
        let mut known = self.written_rules.clone();
        let mut inserted = Vec::new();
        for rule in &live {
            match known.iter().position(|r| r == rule) {
                Some(pos) => {
                    known.swap_remove(pos);
                }
                None => inserted.push(rule.as_str()),
            }
        }
        if inserted.is_empty() {
            return;
        }
        debug!(rules = inserted.len(), "absorbing rules inserted at runtime");
        for rule in inserted {
            self.original_css.push('\n');
            self.original_css.push_str(rule);
        }
        self.written_rules = live;
    }
}

/// Owner of every managed stylesheet.
#[derive(Debug, Clone)]
pub struct StylesheetInterceptor<N> {
    managed: Vec<ManagedStylesheet<N>>,
    blocked: HashSet<String>,
    params: Option<TransformParams>,
}

impl<N> Default for StylesheetInterceptor<N> {
    fn default() -> Self {
        Self {
            managed: Vec::new(),
            blocked: HashSet::new(),
            params: None,
        }
    }
}

impl<N: Clone + PartialEq + std::fmt::Debug> StylesheetInterceptor<N> {
    /// Create an interceptor with nothing managed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Managed records.
    #[must_use]
    pub fn managed(&self) -> &[ManagedStylesheet<N>] {
        &self.managed
    }

    /// Whether `node` is a managed node or a link one replaced.
    #[must_use]
    pub fn is_managed(&self, node: &N) -> bool {
        self.managed
            .iter()
            .any(|m| m.node == *node || m.original_link.as_ref() == Some(node))
    }

    /// Parameters of the last applied pass.
    #[must_use]
    pub const fn params(&self) -> Option<TransformParams> {
        self.params
    }

    /// Take over every readable sheet not yet managed. Returns how many were adopted.
    pub fn scan<H: StyleHost<Node = N>>(&mut self, host: &H) -> usize {
        let mut adopted = 0;
        for sheet in host.stylesheets() {
            if self.is_managed(&sheet.owner) {
                continue;
            }
            if sheet.is_sdk_owned() {
                debug!(href = ?sheet.href, "skipping sdk stylesheet");
                continue;
            }
            match self.adopt(host, sheet) {
                Ok(true) => adopted += 1,
                Ok(false) => {}
                Err(StyleError::CrossOrigin { href }) => {
                    if self.blocked.insert(href.clone()) {
                        warn!(%href, "cross-origin stylesheet left untouched");
                    }
                }
                Err(err) => warn!(error = %err, "stylesheet could not be managed"),
            }
        }
        adopted
    }

    fn adopt<H: StyleHost<Node = N>>(
        &mut self,
        host: &H,
        sheet: SheetSnapshot<N>,
    ) -> Result<bool, StyleError> {
        let text = sheet.text?;
        if text.trim().is_empty() {
            return Ok(false);
        }
        let record = match sheet.kind {
            SheetKind::Inline => ManagedStylesheet {
                node: sheet.owner,
                original_css: text,
                original_link: None,
                options: TransformOptions::default(),
                written: None,
                written_rules: Vec::new(),
            },
            SheetKind::Link => {
                let base_url = sheet.href.as_deref().and_then(|href| Url::parse(href).ok());
                let options = TransformOptions::default().with_base_url(base_url);
                let css = self
                    .params
                    .map_or_else(|| text.clone(), |p| transform_stylesheet(&text, &p, &options));
                let node = host.replace_link(&sheet.owner, &css)?;
                let written_rules = host.live_rules(&node).unwrap_or_default();
                ManagedStylesheet {
                    node,
                    original_css: text,
                    original_link: Some(sheet.owner),
                    options,
                    written: Some(css),
                    written_rules,
                }
            }
        };
        debug!(href = ?sheet.href, "stylesheet managed");
        self.managed.push(record);
        Ok(true)
    }

    /// Re-derive every managed sheet for `params`. Returns how many were rewritten.
    pub fn apply<H: StyleHost<Node = N>>(&mut self, host: &H, params: TransformParams) -> usize {
        self.params = Some(params);
        self.managed.retain(|m| host.is_attached(&m.node));

        let mut rewritten = 0;
        for record in &mut self.managed {
            record.sync_from_host(host);
            let css = transform_stylesheet(&record.original_css, &params, &record.options);
            if record.written.as_ref() == Some(&css) {
                continue;
            }
            match host.set_style_text(&record.node, &css) {
                Ok(()) => {
                    record.written = Some(css);
                    record.written_rules = host.live_rules(&record.node).unwrap_or_default();
                    rewritten += 1;
                }
                Err(err) => warn!(error = %err, "stylesheet rewrite failed"),
            }
        }
        rewritten
    }

    /// Adopt new sheets, then re-derive everything.
    pub fn refresh<H: StyleHost<Node = N>>(&mut self, host: &H, params: TransformParams) -> usize {
        self.params = Some(params);
        self.scan(host);
        self.apply(host, params)
    }

    /// Hand every sheet back in its original form and forget it. Each
    /// restore is attempted even when others fail.
    pub fn restore_all<H: StyleHost<Node = N>>(&mut self, host: &H) -> usize {
        let mut restored = 0;
        for mut record in self.managed.drain(..) {
            record.sync_from_host(host);
            let result = match &record.original_link {
                Some(link) => host.restore_link(&record.node, link),
                None => host.set_style_text(&record.node, &record.original_css),
            };
            match result {
                Ok(()) => restored += 1,
                Err(err) => warn!(error = %err, "stylesheet restore failed"),
            }
        }
        self.blocked.clear();
        self.params = None;
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone)]
    struct Sheet {
        id: usize,
        kind: SheetKind,
        href: Option<String>,
        marked: bool,
        text: Result<String, StyleError>,
        rules: Option<Vec<String>>,
        attached: bool,
    }

    // Flat rules only.
    fn split_rules(css: &str) -> Vec<String> {
        css.split_inclusive('}')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[derive(Default)]
    struct FakeHost {
        sheets: RefCell<Vec<Sheet>>,
        fail_writes: bool,
    }

    impl FakeHost {
        fn push(&self, kind: SheetKind, href: Option<&str>, text: Result<&str, StyleError>) -> usize {
            let mut sheets = self.sheets.borrow_mut();
            let id = sheets.len();
            sheets.push(Sheet {
                id,
                kind,
                href: href.map(str::to_string),
                marked: false,
                text: text.map(str::to_string),
                rules: None,
                attached: true,
            });
            id
        }

        fn insert_rule(&self, id: usize, rule: &str) {
            let mut sheets = self.sheets.borrow_mut();
            let sheet = &mut sheets[id];
            let text = sheet.text.clone().unwrap_or_default();
            sheet
                .rules
                .get_or_insert_with(|| split_rules(&text))
                .push(rule.to_string());
        }

        fn text(&self, id: usize) -> String {
            self.sheets.borrow()[id].text.clone().unwrap()
        }

        fn attached_ids(&self) -> Vec<usize> {
            self.sheets
                .borrow()
                .iter()
                .filter(|s| s.attached)
                .map(|s| s.id)
                .collect()
        }
    }

    impl StyleHost for FakeHost {
        type Node = usize;

        fn stylesheets(&self) -> Vec<SheetSnapshot<usize>> {
            self.sheets
                .borrow()
                .iter()
                .filter(|s| s.attached)
                .map(|s| SheetSnapshot {
                    owner: s.id,
                    href: s.href.clone(),
                    kind: s.kind,
                    marked_sdk: s.marked,
                    text: match &s.rules {
                        Some(rules) => Ok(rules.join("\n")),
                        None => s.text.clone(),
                    },
                })
                .collect()
        }

        fn replace_link(&self, link: &usize, css: &str) -> Result<usize, StyleError> {
            let mut sheets = self.sheets.borrow_mut();
            sheets[*link].attached = false;
            let id = sheets.len();
            sheets.push(Sheet {
                id,
                kind: SheetKind::Inline,
                href: None,
                marked: false,
                text: Ok(css.to_string()),
                rules: None,
                attached: true,
            });
            Ok(id)
        }

        fn style_text(&self, style: &usize) -> Option<String> {
            self.sheets.borrow()[*style].text.clone().ok()
        }

        fn set_style_text(&self, style: &usize, css: &str) -> Result<(), StyleError> {
            if self.fail_writes {
                return Err(StyleError::Write("read-only".into()));
            }
            let mut sheets = self.sheets.borrow_mut();
            let sheet = &mut sheets[*style];
            sheet.text = Ok(css.to_string());
            if sheet.rules.is_some() {
                sheet.rules = Some(split_rules(css));
            }
            Ok(())
        }

        fn restore_link(&self, style: &usize, link: &usize) -> Result<(), StyleError> {
            let mut sheets = self.sheets.borrow_mut();
            sheets[*style].attached = false;
            sheets[*link].attached = true;
            Ok(())
        }

        fn is_attached(&self, node: &usize) -> bool {
            self.sheets.borrow()[*node].attached
        }

        fn live_rules(&self, style: &usize) -> Option<Vec<String>> {
            self.sheets.borrow()[*style].rules.clone()
        }
    }

    fn params() -> TransformParams {
        TransformParams::new(800.0, 600.0, 200.0)
    }

    #[test]
    fn test_inline_sheet_rewritten_and_restored() {
        let host = FakeHost::default();
        let id = host.push(SheetKind::Inline, None, Ok(".banner { width: 50vw; }"));
        let mut interceptor = StylesheetInterceptor::new();

        assert_eq!(interceptor.refresh(&host, params()), 1);
        assert_eq!(host.text(id), ".banner { width: 40.00vw; }");

        assert_eq!(interceptor.restore_all(&host), 1);
        assert_eq!(host.text(id), ".banner { width: 50vw; }");
        assert!(interceptor.managed().is_empty());
    }

    #[test]
    fn test_repeated_refresh_does_not_compound() {
        let host = FakeHost::default();
        let id = host.push(SheetKind::Inline, None, Ok(".a { width: 50vw; }"));
        let mut interceptor = StylesheetInterceptor::new();
        interceptor.refresh(&host, params());
        assert_eq!(interceptor.refresh(&host, params()), 0);
        interceptor.refresh(&host, TransformParams::new(900.0, 600.0, 100.0));
        assert_eq!(host.text(id), ".a { width: 45.00vw; }");
    }

    #[test]
    fn test_link_converted_with_absolute_urls() {
        let host = FakeHost::default();
        let link = host.push(
            SheetKind::Link,
            Some("https://host.example/css/site.css"),
            Ok(".hero { background: url(img/a.png); width: 100vw; }"),
        );
        let mut interceptor = StylesheetInterceptor::new();
        interceptor.refresh(&host, params());

        let style = interceptor.managed()[0].node;
        assert_ne!(style, link);
        assert_eq!(
            host.text(style),
            ".hero { background: url(https://host.example/css/img/a.png); width: 80.00vw; }"
        );

        interceptor.restore_all(&host);
        assert_eq!(host.attached_ids(), vec![link]);
    }

    #[test]
    fn test_cross_origin_and_sdk_sheets_skipped() {
        let host = FakeHost::default();
        host.push(
            SheetKind::Link,
            Some("https://fonts.example/x.css"),
            Err(StyleError::CrossOrigin {
                href: "https://fonts.example/x.css".into(),
            }),
        );
        host.push(
            SheetKind::Link,
            Some("https://cdn.example/PlayLight/sdk.css"),
            Ok(".x { width: 10vw; }"),
        );
        let marked = host.push(SheetKind::Inline, None, Ok("body { margin: 0 }"));
        host.sheets.borrow_mut()[marked].marked = true;

        let mut interceptor = StylesheetInterceptor::new();
        assert_eq!(interceptor.scan(&host), 0);
        assert_eq!(interceptor.scan(&host), 0);
        assert!(interceptor.managed().is_empty());
    }

    #[test]
    fn test_host_edit_becomes_new_original() {
        let host = FakeHost::default();
        let id = host.push(SheetKind::Inline, None, Ok(".a { width: 50vw; }"));
        let mut interceptor = StylesheetInterceptor::new();
        interceptor.refresh(&host, params());

        host.sheets.borrow_mut()[id].text = Ok(".b { width: 10vw; }".into());
        interceptor.refresh(&host, params());
        assert_eq!(host.text(id), ".b { width: 8.00vw; }");

        interceptor.restore_all(&host);
        assert_eq!(host.text(id), ".b { width: 10vw; }");
    }

    #[test]
    fn test_detached_nodes_pruned() {
        let host = FakeHost::default();
        let id = host.push(SheetKind::Inline, None, Ok(".a { width: 50vw; }"));
        let mut interceptor = StylesheetInterceptor::new();
        interceptor.refresh(&host, params());
        host.sheets.borrow_mut()[id].attached = false;
        interceptor.apply(&host, params());
        assert!(interceptor.managed().is_empty());
    }

    #[test]
    fn test_failed_write_keeps_going() {
        let host = FakeHost {
            fail_writes: true,
            ..FakeHost::default()
        };
        host.push(SheetKind::Inline, None, Ok(".a { width: 50vw; }"));
        host.push(SheetKind::Inline, None, Ok(".b { width: 50vw; }"));
        let mut interceptor = StylesheetInterceptor::new();
        assert_eq!(interceptor.refresh(&host, params()), 0);
        assert_eq!(interceptor.managed().len(), 2);
    }

    #[test]
    fn test_rules_inserted_into_empty_sheet_are_adopted() {
        let host = FakeHost::default();
        let id = host.push(SheetKind::Inline, None, Ok(""));
        let mut interceptor = StylesheetInterceptor::new();
        assert_eq!(interceptor.refresh(&host, params()), 0);

        host.insert_rule(id, ".a { width: 50vw; }");
        assert_eq!(interceptor.refresh(&host, params()), 1);
        assert_eq!(host.text(id), ".a { width: 40.00vw; }");

        interceptor.restore_all(&host);
        assert_eq!(host.text(id), ".a { width: 50vw; }");
    }

    #[test]
    fn test_rules_inserted_after_takeover_survive() {
        let host = FakeHost::default();
        let id = host.push(SheetKind::Inline, None, Ok(".a { width: 50vw; }"));
        host.insert_rule(id, ".b { width: 50vw; }");
        let mut interceptor = StylesheetInterceptor::new();
        interceptor.refresh(&host, params());
        assert_eq!(host.text(id), ".a { width: 40.00vw; }\n.b { width: 40.00vw; }");

        host.insert_rule(id, ".late { width: 10vw; }");
        assert_eq!(interceptor.refresh(&host, params()), 1);
        assert_eq!(
            host.text(id),
            ".a { width: 40.00vw; }\n.b { width: 40.00vw; }\n.late { width: 8.00vw; }"
        );
        assert_eq!(interceptor.refresh(&host, params()), 0);

        host.insert_rule(id, ".later { width: 20vw; }");
        interceptor.restore_all(&host);
        assert_eq!(
            host.text(id),
            ".a { width: 50vw; }\n.b { width: 50vw; }\n.late { width: 10vw; }\n.later { width: 20vw; }"
        );
    }
}
