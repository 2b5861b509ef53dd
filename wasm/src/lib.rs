//! Browser host for `draggable-svg`.
//!
//! Nodes are live `web_sys::Element`s, listeners are `gloo` handles that
//! unsubscribe on drop, and every DOM callback routes back into one shared
//! [`DragManager`].

use draggable_svg::{
    Clock, Document, DragConfig, DragError, DragManager, EventKind, GeometryProvider,
    ListenTarget, Matrix, PointerEvent, Rect, Vector, parse_config,
};
use gloo::events::{EventListener, EventListenerOptions};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    Element, Event, EventTarget, HtmlElement, MouseEvent, MutationObserver, MutationObserverInit,
    SvgElement, SvgGraphicsElement, Window,
};

type WebManager = DragManager<WebDocument, WebGeometry, JsClock>;
type Router = Weak<RefCell<WebManager>>;

fn host_error(err: JsValue) -> DragError {
    DragError::Host(format!("{err:?}"))
}

/// Runs `handler` against the shared manager unless it is gone or busy.
fn route(router: &Router, handler: impl FnOnce(&mut WebManager) -> draggable_svg::Result<()>) {
    let Some(shared) = router.upgrade() else {
        return;
    };
    let Ok(mut manager) = shared.try_borrow_mut() else {
        tracing::warn!("drag manager busy, event dropped");
        return;
    };
    if let Err(err) = handler(&mut manager) {
        tracing::warn!(%err, "drag event failed");
    }
}

/// Wall clock read from `Date.now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsClock;

impl Clock for JsClock {
    fn now(&self) -> Duration {
        Duration::from_secs_f64(js_sys::Date::now().max(0.0) / 1000.0)
    }
}

pub struct WebDocument {
    window: Window,
    document: web_sys::Document,
    body: Element,
    router: Router,
}

impl WebDocument {
    fn event_target(&self, target: &ListenTarget<Element>) -> EventTarget {
        match target {
            ListenTarget::Node(node) => node.clone().into(),
            ListenTarget::Document => self.document.clone().into(),
            ListenTarget::Window => self.window.clone().into(),
        }
    }
}

impl Document for WebDocument {
    type Node = Element;
    type Listener = EventListener;

    fn body(&self) -> Element {
        self.body.clone()
    }

    fn tag_name(&self, node: &Element) -> String {
        node.local_name()
    }

    fn owner_svg(&self, node: &Element) -> Option<Element> {
        node.dyn_ref::<SvgElement>()?
            .owner_svg_element()
            .map(Element::from)
    }

    fn find_marked(&self, root: &Element, attribute: &str) -> draggable_svg::Result<Vec<Element>> {
        let selector = format!("svg[{attribute}], svg [{attribute}]");
        let mut found = Vec::new();
        if root.matches(&selector).map_err(host_error)? {
            found.push(root.clone());
        }
        let list = root.query_selector_all(&selector).map_err(host_error)?;
        for index in 0..list.length() {
            if let Some(element) = list.get(index).and_then(|node| node.dyn_into::<Element>().ok()) {
                found.push(element);
            }
        }
        Ok(found)
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn set_attribute(&mut self, node: &Element, name: &str, value: &str) -> draggable_svg::Result<()> {
        node.set_attribute(name, value).map_err(host_error)
    }

    fn remove_attribute(&mut self, node: &Element, name: &str) -> draggable_svg::Result<()> {
        node.remove_attribute(name).map_err(host_error)
    }

    fn set_style_property(
        &mut self,
        node: &Element,
        property: &str,
        value: &str,
    ) -> draggable_svg::Result<()> {
        let style = if let Some(html) = node.dyn_ref::<HtmlElement>() {
            html.style()
        } else if let Some(svg) = node.dyn_ref::<SvgElement>() {
            svg.style()
        } else {
            return Err(DragError::Host(format!(
                "<{}> has no inline style",
                node.local_name()
            )));
        };
        style.set_property(property, value).map_err(host_error)
    }

    fn clone_node(&mut self, node: &Element, deep: bool) -> draggable_svg::Result<Element> {
        node.clone_node_with_deep(deep)
            .map_err(host_error)?
            .dyn_into::<Element>()
            .map_err(|_| DragError::Host("clone is not an element".to_string()))
    }

    fn append_child(&mut self, parent: &Element, child: &Element) -> draggable_svg::Result<()> {
        parent.append_child(child).map(|_| ()).map_err(host_error)
    }

    fn remove_node(&mut self, node: &Element) -> draggable_svg::Result<()> {
        node.remove();
        Ok(())
    }

    fn is_connected(&self, node: &Element) -> bool {
        node.is_connected()
    }

    fn listen(
        &mut self,
        target: ListenTarget<Element>,
        kind: EventKind,
    ) -> draggable_svg::Result<EventListener> {
        let event_target = self.event_target(&target);
        let router = self.router.clone();
        let listener = match (kind, target) {
            (EventKind::PointerDown, ListenTarget::Node(proxy)) => EventListener::new_with_options(
                &event_target,
                kind.dom_name(),
                EventListenerOptions::enable_prevent_default(),
                move |event: &Event| {
                    route(&router, |manager| {
                        let outcome = manager.dispatch(PointerEvent::Down {
                            target: proxy.clone(),
                        })?;
                        if outcome.prevent_default {
                            event.prevent_default();
                        }
                        Ok(())
                    });
                },
            ),
            (EventKind::PointerDown, _) => {
                return Err(DragError::Host(
                    "pointer-down is only observed on proxies".to_string(),
                ));
            }
            (EventKind::PointerMove, _) => {
                EventListener::new(&event_target, kind.dom_name(), move |event: &Event| {
                    let Some(event) = event.dyn_ref::<MouseEvent>() else {
                        return;
                    };
                    let movement = Vector::new(
                        f64::from(event.movement_x()),
                        f64::from(event.movement_y()),
                    );
                    route(&router, |manager| {
                        manager.dispatch(PointerEvent::Move { movement }).map(|_| ())
                    });
                })
            }
            (EventKind::PointerUp, _) => {
                EventListener::new(&event_target, kind.dom_name(), move |_event: &Event| {
                    route(&router, |manager| manager.dispatch(PointerEvent::Up).map(|_| ()));
                })
            }
            (EventKind::Resize, _) => {
                EventListener::new(&event_target, kind.dom_name(), move |_event: &Event| {
                    route(&router, |manager| manager.on_resize().map(|_| ()));
                })
            }
        };
        Ok(listener)
    }

    fn unlisten(&mut self, listener: EventListener) {
        drop(listener);
    }
}

/// Reads layout straight from the browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebGeometry;

impl GeometryProvider<WebDocument> for WebGeometry {
    fn bounding_client_rect(&self, _document: &WebDocument, node: &Element) -> Option<Rect> {
        if !node.is_connected() {
            return None;
        }
        let rect = node.get_bounding_client_rect();
        Some(Rect::new(rect.x(), rect.y(), rect.width(), rect.height()))
    }

    fn screen_ctm(&self, _document: &WebDocument, svg: &Element) -> Option<Matrix> {
        let ctm = svg.dyn_ref::<SvgGraphicsElement>()?.get_screen_ctm()?;
        Some(Matrix::new(
            f64::from(ctm.a()),
            f64::from(ctm.b()),
            f64::from(ctm.c()),
            f64::from(ctm.d()),
            f64::from(ctm.e()),
            f64::from(ctm.f()),
        ))
    }

    fn scroll_offset(&self, document: &WebDocument) -> Vector {
        Vector::new(
            document.window.scroll_x().unwrap_or(0.0),
            document.window.scroll_y().unwrap_or(0.0),
        )
    }
}

/// Re-scans the body whenever nodes are added or a marker appears.
struct MarkerObserver {
    observer: MutationObserver,
    _callback: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
}

impl MarkerObserver {
    fn install(router: Router, body: &Element, marker: &str) -> Result<Self, JsValue> {
        let callback = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |_records: js_sys::Array, _observer: MutationObserver| {
                route(&router, |manager| {
                    let body = manager.document().body();
                    manager.activate(&body).map(|_| ())
                });
            },
        );
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_attributes(true);
        init.set_attribute_filter(&js_sys::Array::of1(&JsValue::from_str(marker)));
        observer.observe_with_options(body, &init)?;
        Ok(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for MarkerObserver {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

fn config_from_options(options_json: Option<String>) -> Result<DragConfig, String> {
    match options_json {
        Some(raw) => parse_config(&raw).map_err(|error| error.to_string()),
        None => Ok(DragConfig::default()),
    }
}

/// Page-level handle. Create one, call `initialize()` once the DOM is
/// ready, and `shutdown()` (or `free()`) before loading a replacement.
#[wasm_bindgen]
pub struct DraggableBehavior {
    manager: Rc<RefCell<WebManager>>,
    observer: Option<MarkerObserver>,
}

#[wasm_bindgen]
impl DraggableBehavior {
    #[wasm_bindgen(constructor)]
    pub fn new(options_json: Option<String>) -> Result<DraggableBehavior, JsValue> {
        let config = config_from_options(options_json).map_err(|error| JsValue::from_str(&error))?;
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let body: Element = document
            .body()
            .ok_or_else(|| JsValue::from_str("document has no body"))?
            .into();

        let manager = Rc::new_cyclic(|router: &Router| {
            let host = WebDocument {
                window,
                document,
                body,
                router: router.clone(),
            };
            RefCell::new(DragManager::with_clock(host, WebGeometry, config, JsClock))
        });
        Ok(Self {
            manager,
            observer: None,
        })
    }

    /// Registers every marked element and starts watching for new ones.
    /// Returns how many elements were registered.
    pub fn initialize(&mut self) -> Result<usize, JsValue> {
        self.observer = None;
        let (count, body, marker) = {
            let mut manager = self
                .manager
                .try_borrow_mut()
                .map_err(|error| JsValue::from_str(&error.to_string()))?;
            let count = manager
                .initialize()
                .map_err(|error| JsValue::from_str(&error.to_string()))?;
            (
                count,
                manager.document().body(),
                manager.config().marker_attribute.clone(),
            )
        };
        self.observer = Some(MarkerObserver::install(
            Rc::downgrade(&self.manager),
            &body,
            &marker,
        )?);
        Ok(count)
    }

    /// Stops observing, removes every proxy and detaches every listener.
    pub fn shutdown(&mut self) {
        self.observer = None;
        match self.manager.try_borrow_mut() {
            Ok(mut manager) => manager.shutdown(),
            Err(_) => tracing::warn!("drag manager busy, shutdown skipped"),
        }
    }

    /// Re-aligns every proxy immediately, bypassing the resize throttle.
    pub fn realign(&self) -> Result<(), JsValue> {
        let mut manager = self
            .manager
            .try_borrow_mut()
            .map_err(|error| JsValue::from_str(&error.to_string()))?;
        manager
            .resize_all()
            .map_err(|error| JsValue::from_str(&error.to_string()))
    }

    #[wasm_bindgen(getter)]
    pub fn count(&self) -> usize {
        self.manager.try_borrow().map(|manager| manager.len()).unwrap_or(0)
    }

    #[wasm_bindgen(getter)]
    pub fn dragging(&self) -> usize {
        self.manager
            .try_borrow()
            .map(|manager| manager.dragging())
            .unwrap_or(0)
    }
}

impl Drop for DraggableBehavior {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::config_from_options;

    #[test]
    fn options_default_when_absent() {
        let config = config_from_options(None).unwrap();
        assert_eq!(config.marker_attribute, "data-draggable");
    }

    #[test]
    fn options_override_marker() {
        let config =
            config_from_options(Some(r#"{"markerAttribute": "data-grab"}"#.to_string())).unwrap();
        assert_eq!(config.marker_attribute, "data-grab");
        assert_eq!(config.resize_throttle_ms, 30);
    }

    #[test]
    fn blank_marker_is_rejected() {
        assert!(config_from_options(Some(r#"{"markerAttribute": ""}"#.to_string())).is_err());
    }
}
