use crate::config::DragConfig;
use crate::controller::{Controller, DragState, PointerEvent};
use crate::dom::{Document, EventKind, ListenTarget};
use crate::error::Result;
use crate::layout::GeometryProvider;
use crate::throttle::{Clock, SystemClock, Throttle};
use tracing::{debug, trace, warn};

/// What the host should do after delivering an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    pub handled: bool,
    /// Suppress the default action (text selection on pointer-down).
    pub prevent_default: bool,
}

impl DispatchOutcome {
    fn ignored() -> Self {
        Self::default()
    }
}

/// Owns every live [`Controller`] on a page, at most one per source element.
///
/// The host constructs one manager, calls [`DragManager::initialize`] once
/// the page is ready, forwards pointer and resize events, and calls
/// [`DragManager::shutdown`] before dropping or reloading it.
pub struct DragManager<D: Document, G, C = SystemClock> {
    document: D,
    geometry: G,
    config: DragConfig,
    controllers: Vec<Controller<D>>,
    resize_throttle: Throttle<C>,
    resize_listener: Option<D::Listener>,
}

impl<D, G> DragManager<D, G, SystemClock>
where
    D: Document,
    G: GeometryProvider<D>,
{
    pub fn new(document: D, geometry: G, config: DragConfig) -> Self {
        Self::with_clock(document, geometry, config, SystemClock::default())
    }
}

impl<D, G, C> DragManager<D, G, C>
where
    D: Document,
    G: GeometryProvider<D>,
    C: Clock,
{
    pub fn with_clock(document: D, geometry: G, config: DragConfig, clock: C) -> Self {
        let resize_throttle = Throttle::new(config.resize_interval(), clock);
        Self {
            document,
            geometry,
            config,
            controllers: Vec::new(),
            resize_throttle,
            resize_listener: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.resize_listener.is_some()
    }

    /// Subscribes to viewport resizes and registers every marked element
    /// in the body. Calling it again first shuts the previous run down, so a
    /// reloaded host never ends up with duplicate proxies. A failed run is
    /// shut down before the error is returned.
    pub fn initialize(&mut self) -> Result<usize> {
        if self.is_initialized() {
            debug!(controllers = self.controllers.len(), "re-initializing drag manager");
            self.shutdown();
        }
        let listener = self.document.listen(ListenTarget::Window, EventKind::Resize)?;
        self.resize_listener = Some(listener);
        let body = self.document.body();
        let activated = self.activate(&body);
        if activated.is_err() {
            self.shutdown();
        }
        activated
    }

    /// Removes every proxy and stops listening for resizes.
    pub fn shutdown(&mut self) {
        self.teardown();
        if let Some(listener) = self.resize_listener.take() {
            self.document.unlisten(listener);
        }
        self.resize_throttle.reset();
    }

    /// Registers every marked element under `root`. Returns how many were new.
    pub fn activate(&mut self, root: &D::Node) -> Result<usize> {
        let marked = self
            .document
            .find_marked(root, &self.config.marker_attribute)?;
        let mut added = 0;
        for element in marked {
            if self.register(element)? {
                added += 1;
            }
        }
        if added > 0 {
            debug!(added, total = self.controllers.len(), "activated draggables");
        }
        Ok(added)
    }

    /// Creates a controller for `element` unless one already exists.
    ///
    /// The marker attribute is consumed before the proxy is cloned, so
    /// neither the source nor its proxy match a later scan.
    pub fn register(&mut self, element: D::Node) -> Result<bool> {
        if self.controller_index(&element).is_some() {
            trace!(?element, "already registered");
            return Ok(false);
        }
        self.document
            .remove_attribute(&element, &self.config.marker_attribute)?;
        let controller = Controller::new(&mut self.document, &self.geometry, element, &self.config)?;
        debug!(source = ?controller.source(), position = ?controller.position(), "registered draggable");
        self.controllers.push(controller);
        Ok(true)
    }

    /// Viewport resize notification, rate limited. Returns whether the
    /// controllers were recomputed.
    pub fn on_resize(&mut self) -> Result<bool> {
        if !self.resize_throttle.try_acquire() {
            trace!("resize dropped by throttle");
            return Ok(false);
        }
        self.resize_all()?;
        Ok(true)
    }

    pub fn resize_all(&mut self) -> Result<()> {
        for controller in &mut self.controllers {
            controller.resize(&mut self.document, &self.geometry)?;
        }
        debug!(controllers = self.controllers.len(), "resized draggables");
        Ok(())
    }

    pub fn dispatch(&mut self, event: PointerEvent<D::Node>) -> Result<DispatchOutcome> {
        match event {
            PointerEvent::Down { target } => {
                let Some(controller) = self
                    .controllers
                    .iter_mut()
                    .find(|controller| *controller.proxy() == target)
                else {
                    warn!(?target, "pointer-down on an unknown proxy");
                    return Ok(DispatchOutcome::ignored());
                };
                controller.pointer_down(&mut self.document)?;
                Ok(DispatchOutcome {
                    handled: true,
                    prevent_default: true,
                })
            }
            PointerEvent::Move { movement } => {
                let mut handled = false;
                for controller in self.controllers.iter_mut().filter(|c| c.is_dragging()) {
                    controller.pointer_move(&mut self.document, &self.geometry, movement)?;
                    trace!(position = ?controller.position(), "drag move");
                    handled = true;
                }
                Ok(DispatchOutcome {
                    handled,
                    prevent_default: false,
                })
            }
            PointerEvent::Up => {
                let mut handled = false;
                for controller in &mut self.controllers {
                    handled |= controller.pointer_up(&mut self.document);
                }
                Ok(DispatchOutcome {
                    handled,
                    prevent_default: false,
                })
            }
        }
    }

    /// Removes every proxy and empties the registry.
    pub fn teardown(&mut self) {
        let count = self.controllers.len();
        for controller in self.controllers.drain(..) {
            if let Err(err) = controller.remove(&mut self.document) {
                warn!(%err, "failed to remove drag proxy");
            }
        }
        if count > 0 {
            debug!(count, "tore down draggables");
        }
    }

    fn controller_index(&self, source: &D::Node) -> Option<usize> {
        self.controllers
            .iter()
            .position(|controller| controller.source() == source)
    }

    pub fn controller_for(&self, source: &D::Node) -> Option<&Controller<D>> {
        self.controller_index(source).map(|idx| &self.controllers[idx])
    }

    pub fn controllers(&self) -> &[Controller<D>] {
        &self.controllers
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn dragging(&self) -> usize {
        self.controllers
            .iter()
            .filter(|controller| controller.state() == DragState::Dragging)
            .count()
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    /// Direct access for hosts that mutate the page between scans.
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut G {
        &mut self.geometry
    }

    pub fn config(&self) -> &DragConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        self.resize_throttle.clock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, NodeId};
    use crate::geometry::{Matrix, Rect, Vector};
    use crate::layout::FixedGeometry;
    use crate::throttle::ManualClock;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const PAGE: &str = r#"<main>
  <svg id="a" data-draggable="" width="50" height="50"><rect width="50" height="50"/></svg>
  <svg id="b" width="50" height="50"><g id="b-face" data-draggable=""><rect width="10" height="10"/></g></svg>
</main>"#;

    type TestManager = DragManager<MemoryDocument, FixedGeometry<NodeId>, ManualClock>;

    fn manager() -> (TestManager, ManualClock) {
        let doc = MemoryDocument::from_markup(PAGE).unwrap();
        let a = doc.element_by_id("a").unwrap();
        let b = doc.element_by_id("b").unwrap();
        let face = doc.element_by_id("b-face").unwrap();
        let geometry = FixedGeometry::new()
            .with_rect(a, Rect::new(0.0, 0.0, 50.0, 50.0))
            .with_rect(face, Rect::new(0.0, 60.0, 10.0, 10.0))
            .with_ctm(a, Matrix::IDENTITY)
            .with_ctm(b, Matrix::translate(0.0, 50.0));
        let clock = ManualClock::new();
        let manager = DragManager::with_clock(doc, geometry, DragConfig::default(), clock.clone());
        (manager, clock)
    }

    fn id(manager: &TestManager, id: &str) -> NodeId {
        manager.document().element_by_id(id).unwrap()
    }

    #[test]
    fn initialize_registers_marked_elements_and_strips_marker() {
        let (mut manager, _) = manager();
        assert_eq!(manager.initialize().unwrap(), 2);
        assert_eq!(manager.len(), 2);
        let a = id(&manager, "a");
        assert!(!manager.document().has_attribute(a, "data-draggable"));
        let proxy = *manager.controller_for(&a).unwrap().proxy();
        assert!(!manager.document().has_attribute(proxy, "data-draggable"));
        // a rescan finds nothing new, proxies included
        let body = manager.document().body();
        assert_eq!(manager.activate(&body).unwrap(), 0);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn duplicate_registration_is_ignored_and_keeps_marker() {
        let (mut manager, _) = manager();
        manager.initialize().unwrap();
        let a = id(&manager, "a");
        manager.document_mut().put_attribute(a, "data-draggable", "");
        let body = manager.document().body();
        assert_eq!(manager.activate(&body).unwrap(), 0);
        assert_eq!(manager.len(), 2);
        assert!(manager.document().has_attribute(a, "data-draggable"));
    }

    #[test]
    fn reinitializing_does_not_duplicate_proxies() {
        let (mut manager, _) = manager();
        manager.initialize().unwrap();
        let a = id(&manager, "a");
        manager.document_mut().put_attribute(a, "data-draggable", "");
        manager.initialize().unwrap();
        assert_eq!(manager.len(), 1);
        // body: <main>, plus the single live proxy
        let body = manager.document().body();
        assert_eq!(manager.document().children(body).len(), 2);
    }

    #[test]
    fn dispatch_routes_drag_to_the_grabbed_proxy() {
        let (mut manager, _) = manager();
        manager.initialize().unwrap();
        let face = id(&manager, "b-face");
        let proxy = *manager.controller_for(&face).unwrap().proxy();

        let outcome = manager.dispatch(PointerEvent::Down { target: proxy }).unwrap();
        assert!(outcome.handled && outcome.prevent_default);
        assert_eq!(manager.dragging(), 1);

        manager
            .dispatch(PointerEvent::Move {
                movement: Vector::new(4.0, 2.0),
            })
            .unwrap();
        assert_eq!(
            manager.document().get_attribute(face, "transform"),
            Some("translate(4,2)")
        );
        let a = id(&manager, "a");
        assert_eq!(manager.document().get_attribute(a, "transform"), None);

        assert!(manager.dispatch(PointerEvent::Up).unwrap().handled);
        assert_eq!(manager.dragging(), 0);
        assert!(!manager
            .dispatch(PointerEvent::Move {
                movement: Vector::new(1.0, 1.0)
            })
            .unwrap()
            .handled);
    }

    #[test]
    fn pointer_down_elsewhere_is_ignored() {
        let (mut manager, _) = manager();
        manager.initialize().unwrap();
        let a = id(&manager, "a");
        let outcome = manager.dispatch(PointerEvent::Down { target: a }).unwrap();
        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(manager.dragging(), 0);
    }

    #[test]
    fn resize_is_rate_limited() {
        let (mut manager, clock) = manager();
        manager.initialize().unwrap();
        assert!(manager.on_resize().unwrap());
        clock.advance(Duration::from_millis(20));
        assert!(!manager.on_resize().unwrap());
        clock.advance(Duration::from_millis(10));
        assert!(manager.on_resize().unwrap());
    }

    #[test]
    fn resize_realigns_every_proxy() {
        let (mut manager, clock) = manager();
        manager.initialize().unwrap();
        let a = id(&manager, "a");
        manager.geometry_mut().set_rect(a, Rect::new(30.0, 5.0, 50.0, 50.0));
        clock.advance(Duration::from_millis(100));
        manager.on_resize().unwrap();
        let proxy = *manager.controller_for(&a).unwrap().proxy();
        assert_eq!(
            manager.document().style_property(proxy, "left").as_deref(),
            Some("30px")
        );
    }

    #[test]
    fn shutdown_leaves_nothing_behind() {
        let (mut manager, _) = manager();
        manager.initialize().unwrap();
        let face = id(&manager, "b-face");
        let proxy = *manager.controller_for(&face).unwrap().proxy();
        manager.dispatch(PointerEvent::Down { target: proxy }).unwrap();

        manager.shutdown();
        assert!(manager.is_empty());
        assert!(!manager.is_initialized());
        assert_eq!(manager.document().active_listeners(), 0);
        let body = manager.document().body();
        assert_eq!(manager.document().children(body).len(), 1);
    }

    #[test]
    fn missing_layout_fails_activation() {
        let doc = MemoryDocument::from_markup(r#"<svg id="s" data-draggable=""/>"#).unwrap();
        let mut manager =
            DragManager::new(doc, FixedGeometry::<NodeId>::new(), DragConfig::default());
        assert!(manager.initialize().is_err());
        assert!(manager.is_empty());
        assert!(!manager.is_initialized());
        assert_eq!(manager.document().active_listeners(), 0);
    }

    #[test]
    fn marked_child_of_a_marked_root_is_registered_once() {
        let doc = MemoryDocument::from_markup(
            r#"<svg id="root" data-draggable="" width="50" height="50"><g id="inner" data-draggable=""><rect width="10" height="10"/></g></svg>"#,
        )
        .unwrap();
        let root = doc.element_by_id("root").unwrap();
        let inner = doc.element_by_id("inner").unwrap();
        let geometry = FixedGeometry::new()
            .with_rect(root, Rect::new(0.0, 0.0, 50.0, 50.0))
            .with_rect(inner, Rect::new(0.0, 0.0, 10.0, 10.0))
            .with_ctm(root, Matrix::IDENTITY);
        let mut manager = DragManager::new(doc, geometry, DragConfig::default());

        assert_eq!(manager.initialize().unwrap(), 2);
        let body = manager.document().body();
        assert_eq!(manager.activate(&body).unwrap(), 0);
        assert_eq!(manager.len(), 2);
    }
}
