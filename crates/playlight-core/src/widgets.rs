//! Widget discovery and the main app container.
//!
//! Widgets mount into host-provided containers anywhere in the document and
//! live for the page's lifetime. The app container hosts the button and the
//! discovery overlay and is put back if a host script removes it.

use tracing::{debug, error};

use crate::dom::Dom;
use crate::error::{DomError, SdkError};

/// Default class marking widget containers.
pub const WIDGET_MARKER_CLASS: &str = "playlight-widget-carousel";
/// Attribute set on a container once a widget is mounted into it.
pub const MOUNTED_ATTRIBUTE: &str = "data-playlight-initialized";
/// Id of the main app container.
pub const APP_CONTAINER_ID: &str = "playlight-sdk-container";
/// Classes of the main app container.
pub const APP_CONTAINER_CLASSES: [&str; 2] = ["playlight-sdk", "playlight-sdk-container"];

/// Mount a widget into every unmounted container carrying `marker_class`.
///
/// The container is flagged before mounting so a failing mount is never
/// retried. Returns the number of containers newly flagged.
pub fn discover_widgets<D, F>(dom: &D, marker_class: &str, mut mount: F) -> usize
where
    D: Dom,
    F: FnMut(&D::Node) -> Result<(), SdkError>,
{
    let mut flagged = 0;
    for container in dom.elements_with_class(marker_class) {
        if dom.attribute(&container, MOUNTED_ATTRIBUTE).is_some() {
            continue;
        }
        if let Err(err) = dom.set_attribute(&container, MOUNTED_ATTRIBUTE, "true") {
            error!(error = %err, "widget container could not be flagged");
            continue;
        }
        flagged += 1;
        if let Err(err) = mount(&container) {
            error!(error = %err, "widget mount failed");
        }
    }
    if flagged > 0 {
        debug!(flagged, "widgets mounted");
    }
    flagged
}

/// Create the app container and append it to the body.
pub fn mount_app_container<D: Dom>(dom: &D) -> Result<D::Node, DomError> {
    let body = dom.body()?;
    let container = dom.create_element("div")?;
    dom.set_id(&container, APP_CONTAINER_ID)?;
    for class in APP_CONTAINER_CLASSES {
        dom.add_class(&container, class)?;
    }
    dom.append_child(&body, &container)?;
    Ok(container)
}

/// Whether the app container has been removed from the document.
pub fn app_container_detached<D: Dom>(dom: &D, container: &D::Node) -> bool {
    match dom.document_element() {
        Ok(html) => !dom.contains(&html, container),
        Err(_) => true,
    }
}

/// Re-append a removed app container. Returns true when it was detached.
pub fn restore_app_container<D: Dom>(dom: &D, container: &D::Node) -> Result<bool, DomError> {
    if !app_container_detached(dom, container) {
        return Ok(false);
    }
    let body = dom.body()?;
    dom.append_child(&body, container)?;
    Ok(true)
}
