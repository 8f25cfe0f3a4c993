//! [`Dom`] over the live browser document.

use playlight_core::dom::{Dom, InlineStyle};
use playlight_core::DomError;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlCollection, HtmlElement, Window};

/// The page's document, as seen by the graft.
#[derive(Debug, Clone)]
pub struct BrowserDom {
    window: Window,
    document: Document,
}

impl BrowserDom {
    /// Bind to the current window.
    pub fn new() -> Result<Self, DomError> {
        let window = web_sys::window().ok_or_else(|| DomError::Platform("no window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| DomError::Platform("no document".into()))?;
        Ok(Self { window, document })
    }

    /// Underlying window.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Underlying document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// `<head>`, or the root element when the page has none.
    pub fn head(&self) -> Result<Element, DomError> {
        match self.document.head() {
            Some(head) => Ok(head.into()),
            None => self.document_element(),
        }
    }
}

/// Readable text of a thrown JS value.
pub(crate) fn describe(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| {
            js_sys::Reflect::get(err, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{err:?}"))
}

/// Map a thrown JS value to a [`DomError`].
pub(crate) fn platform(err: JsValue) -> DomError {
    DomError::Platform(describe(&err))
}

fn collection(items: &HtmlCollection) -> Vec<Element> {
    (0..items.length()).filter_map(|i| items.item(i)).collect()
}

fn style_of(node: &Element) -> Option<web_sys::CssStyleDeclaration> {
    node.dyn_ref::<HtmlElement>().map(HtmlElement::style)
}

impl Dom for BrowserDom {
    type Node = Element;

    fn document_element(&self) -> Result<Element, DomError> {
        self.document
            .document_element()
            .ok_or_else(|| DomError::Platform("no document element".into()))
    }

    fn body(&self) -> Result<Element, DomError> {
        self.document.body().map(Element::from).ok_or(DomError::MissingBody)
    }

    fn children(&self, node: &Element) -> Vec<Element> {
        collection(&node.children())
    }

    fn parent(&self, node: &Element) -> Option<Element> {
        node.parent_element()
    }

    fn contains(&self, ancestor: &Element, node: &Element) -> bool {
        ancestor.contains(Some(node.as_ref()))
    }

    fn tag_name(&self, node: &Element) -> String {
        node.tag_name().to_ascii_uppercase()
    }

    fn id(&self, node: &Element) -> String {
        node.id()
    }

    fn descendant_count(&self, node: &Element) -> usize {
        node.get_elements_by_tag_name("*").length() as usize
    }

    fn create_element(&self, tag: &str) -> Result<Element, DomError> {
        self.document.create_element(tag).map_err(platform)
    }

    fn set_id(&self, node: &Element, id: &str) -> Result<(), DomError> {
        node.set_id(id);
        Ok(())
    }

    fn append_child(&self, parent: &Element, child: &Element) -> Result<(), DomError> {
        parent.append_child(child).map(drop).map_err(platform)
    }

    fn insert_before(&self, parent: &Element, child: &Element, reference: &Element) -> Result<(), DomError> {
        if reference.parent_element().as_ref() != Some(parent) {
            return Err(DomError::NotAChild);
        }
        parent
            .insert_before(child, Some(reference.as_ref()))
            .map(drop)
            .map_err(platform)
    }

    fn remove(&self, node: &Element) -> Result<(), DomError> {
        node.remove();
        Ok(())
    }

    fn classes(&self, node: &Element) -> Vec<String> {
        let list = node.class_list();
        (0..list.length()).filter_map(|i| list.item(i)).collect()
    }

    fn has_class(&self, node: &Element, class: &str) -> bool {
        node.class_list().contains(class)
    }

    fn add_class(&self, node: &Element, class: &str) -> Result<(), DomError> {
        node.class_list().add_1(class).map_err(platform)
    }

    fn remove_class(&self, node: &Element, class: &str) -> Result<(), DomError> {
        node.class_list().remove_1(class).map_err(platform)
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn set_attribute(&self, node: &Element, name: &str, value: &str) -> Result<(), DomError> {
        node.set_attribute(name, value).map_err(platform)
    }

    fn remove_attribute(&self, node: &Element, name: &str) -> Result<(), DomError> {
        node.remove_attribute(name).map_err(platform)
    }

    fn computed_style(&self, node: &Element, property: &str) -> Option<String> {
        self.window
            .get_computed_style(node)
            .ok()
            .flatten()?
            .get_property_value(property)
            .ok()
    }

    fn inline_style(&self, node: &Element, property: &str) -> Option<InlineStyle> {
        let style = style_of(node)?;
        let value = style.get_property_value(property).ok()?;
        if value.is_empty() {
            return None;
        }
        Some(InlineStyle::new(value, style.get_property_priority(property)))
    }

    fn set_inline_style(&self, node: &Element, property: &str, style: &InlineStyle) -> Result<(), DomError> {
        style_of(node)
            .ok_or_else(|| DomError::Platform("element has no inline style".into()))?
            .set_property_with_priority(property, &style.value, &style.priority)
            .map_err(platform)
    }

    fn remove_inline_style(&self, node: &Element, property: &str) -> Result<(), DomError> {
        style_of(node)
            .ok_or_else(|| DomError::Platform("element has no inline style".into()))?
            .remove_property(property)
            .map(drop)
            .map_err(platform)
    }

    fn elements_with_class(&self, class: &str) -> Vec<Element> {
        collection(&self.document.get_elements_by_class_name(class))
    }
}
