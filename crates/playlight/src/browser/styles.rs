//! [`StyleHost`] over `document.styleSheets`, and the SDK's own layout sheet.

use playlight_core::stylesheet::{SheetKind, SheetSnapshot, StyleHost, SDK_STYLE_ATTRIBUTE};
use playlight_core::{DomError, StyleError};
use wasm_bindgen::JsCast;
use web_sys::{CssStyleSheet, Document, Element, HtmlStyleElement};

use super::dom::platform;

/// Layout rules for the grafted page: root element in a row, content
/// scrolling inside the wrapper, sidebar to its right.
pub const LAYOUT_CSS: &str = "\
html.playlight-sdk-html {
  display: flex !important;
  flex-direction: row !important;
  width: 100% !important;
  height: 100% !important;
  overflow: hidden !important;
}
html.playlight-sdk-html > body.playlight-sdk-body {
  flex: 1 1 auto !important;
  min-width: 0 !important;
  height: 100% !important;
  margin: 0 !important;
  overflow: hidden !important;
  position: relative !important;
}
body.playlight-sdk-body > .playlight-sdk-inner-wrapper {
  height: 100% !important;
  overflow: auto !important;
  position: relative !important;
}
html.playlight-sdk-html > .playlight-sdk-container-sidebar {
  flex: 0 0 auto !important;
  width: 320px;
  height: 100% !important;
  overflow: hidden auto !important;
}
";

/// Stylesheets of the live document.
#[derive(Debug, Clone)]
pub struct BrowserStyleHost {
    document: Document,
}

impl BrowserStyleHost {
    /// Host over `document`.
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    /// Insert the SDK layout sheet into `<head>`. Never intercepted, as it
    /// carries [`SDK_STYLE_ATTRIBUTE`].
    pub fn inject_layout(&self) -> Result<Element, DomError> {
        let style = self.document.create_element("style").map_err(platform)?;
        style.set_attribute(SDK_STYLE_ATTRIBUTE, "").map_err(platform)?;
        style.set_text_content(Some(LAYOUT_CSS));
        let parent: Element = match self.document.head() {
            Some(head) => head.into(),
            None => self
                .document
                .document_element()
                .ok_or_else(|| DomError::Platform("no document element".into()))?,
        };
        parent.append_child(&style).map_err(platform)?;
        Ok(style)
    }

    fn snapshot(&self, sheet: &web_sys::StyleSheet) -> Option<SheetSnapshot<Element>> {
        let owner: Element = sheet.owner_node()?.dyn_into().ok()?;
        let href = sheet.href().ok().flatten();
        let kind = if owner.tag_name().eq_ignore_ascii_case("link") {
            SheetKind::Link
        } else {
            SheetKind::Inline
        };
        let text = match kind {
            // Rules added through `insertRule` never reach the text content.
            SheetKind::Inline => read_rules(sheet, None)
                .or_else(|_| Ok(owner.text_content().unwrap_or_default())),
            SheetKind::Link => read_rules(sheet, href.as_deref()),
        };
        Some(SheetSnapshot {
            marked_sdk: owner.has_attribute(SDK_STYLE_ATTRIBUTE),
            owner,
            href,
            kind,
            text,
        })
    }
}

fn read_rules(sheet: &web_sys::StyleSheet, href: Option<&str>) -> Result<String, StyleError> {
    let cross_origin = || StyleError::CrossOrigin {
        href: href.unwrap_or_default().to_string(),
    };
    let sheet = sheet.dyn_ref::<CssStyleSheet>().ok_or(StyleError::NoOwner)?;
    let rules = rule_texts(sheet).ok_or_else(cross_origin)?;
    Ok(rules.join("\n"))
}

fn rule_texts(sheet: &CssStyleSheet) -> Option<Vec<String>> {
    let rules = sheet.css_rules().ok()?;
    Some(
        (0..rules.length())
            .filter_map(|i| rules.item(i))
            .map(|rule| rule.css_text())
            .collect(),
    )
}

impl StyleHost for BrowserStyleHost {
    type Node = Element;

    fn stylesheets(&self) -> Vec<SheetSnapshot<Element>> {
        let sheets = self.document.style_sheets();
        (0..sheets.length())
            .filter_map(|i| sheets.item(i))
            .filter_map(|sheet| self.snapshot(&sheet))
            .collect()
    }

    fn replace_link(&self, link: &Element, css: &str) -> Result<Element, StyleError> {
        let parent = link.parent_node().ok_or(StyleError::NoOwner)?;
        let style = self.document.create_element("style").map_err(platform)?;
        if let Some(media) = link.get_attribute("media") {
            style.set_attribute("media", &media).map_err(platform)?;
        }
        style.set_text_content(Some(css));
        parent
            .insert_before(&style, Some(link.as_ref()))
            .map_err(|err| StyleError::Write(platform(err).to_string()))?;
        link.remove();
        Ok(style)
    }

    fn style_text(&self, style: &Element) -> Option<String> {
        style.text_content()
    }

    fn set_style_text(&self, style: &Element, css: &str) -> Result<(), StyleError> {
        style.set_text_content(Some(css));
        Ok(())
    }

    fn restore_link(&self, style: &Element, link: &Element) -> Result<(), StyleError> {
        match style.parent_node() {
            Some(parent) => {
                parent
                    .insert_before(link, Some(style.as_ref()))
                    .map_err(|err| StyleError::Write(platform(err).to_string()))?;
                style.remove();
            }
            None => {
                let head = self.document.head().ok_or(StyleError::NoOwner)?;
                head.append_child(link)
                    .map_err(|err| StyleError::Write(platform(err).to_string()))?;
            }
        }
        Ok(())
    }

    fn is_attached(&self, node: &Element) -> bool {
        self.document.contains(Some(node.as_ref()))
    }

    fn live_rules(&self, style: &Element) -> Option<Vec<String>> {
        let sheet = style.dyn_ref::<HtmlStyleElement>()?.sheet()?;
        rule_texts(sheet.dyn_ref::<CssStyleSheet>()?)
    }
}
