use crate::config::DragConfig;
use crate::convert::{isolate, screen_to_local};
use crate::dom::{Document, EventKind, ListenTarget};
use crate::error::{DragError, Result};
use crate::geometry::{Point, Rect, Vector, format_px, format_translate};
use crate::layout::GeometryProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging,
}

impl DragState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dragging => "dragging",
        }
    }
}

/// Pointer input as delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent<N> {
    /// Button pressed over `target`.
    Down { target: N },
    /// Relative movement since the previous move event, in screen pixels.
    Move { movement: Vector },
    Up,
}

/// Listeners held for the length of one drag.
struct DragSession<L> {
    pointer_move: L,
    pointer_up: L,
}

/// Drag behavior bound to one source element.
///
/// The proxy is what the user grabs; the source follows it through a
/// `translate(..)` transform expressed in the owning `<svg>`'s user units.
pub struct Controller<D: Document> {
    source: D::Node,
    proxy: D::Node,
    /// Position recorded by the last `resize`, the drag's zero point.
    origin: Point,
    position: Point,
    size: Rect,
    pointer_down: Option<D::Listener>,
    session: Option<DragSession<D::Listener>>,
}

impl<D: Document> Controller<D> {
    pub fn new<G: GeometryProvider<D>>(
        document: &mut D,
        geometry: &G,
        source: D::Node,
        config: &DragConfig,
    ) -> Result<Self> {
        let proxy = isolate(document, geometry, &source)?;
        // the deep clone may carry markers of nested sources
        for marked in document.find_marked(&proxy, &config.marker_attribute)? {
            document.remove_attribute(&marked, &config.marker_attribute)?;
        }
        document.set_style_property(&proxy, "cursor", &config.proxy_cursor)?;
        document.set_style_property(&proxy, "position", "absolute")?;

        let mut controller = Self {
            source,
            proxy,
            origin: Point::ZERO,
            position: Point::ZERO,
            size: Rect::default(),
            pointer_down: None,
            session: None,
        };
        // the proxy stays detached until it is fully wired up
        controller.resize(document, geometry)?;
        let listener = document.listen(
            ListenTarget::Node(controller.proxy.clone()),
            EventKind::PointerDown,
        )?;
        let body = document.body();
        if let Err(err) = document.append_child(&body, &controller.proxy) {
            document.unlisten(listener);
            return Err(err);
        }
        controller.pointer_down = Some(listener);
        Ok(controller)
    }

    pub fn source(&self) -> &D::Node {
        &self.source
    }

    pub fn proxy(&self) -> &D::Node {
        &self.proxy
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    /// Last measured source rectangle, in viewport coordinates.
    pub fn source_rect(&self) -> Rect {
        self.size
    }

    pub fn state(&self) -> DragState {
        if self.session.is_some() {
            DragState::Dragging
        } else {
            DragState::Idle
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    /// Drops any drag offset and lays the proxy exactly over the source again.
    pub fn resize<G: GeometryProvider<D>>(&mut self, document: &mut D, geometry: &G) -> Result<()> {
        document.remove_attribute(&self.source, "transform")?;
        let rect = geometry
            .bounding_client_rect(document, &self.source)
            .ok_or(DragError::NoLayoutBox)?;
        self.origin = rect.origin();
        self.position = rect.origin();
        self.size = rect;

        let scroll = geometry.scroll_offset(document);
        document.set_style_property(&self.proxy, "left", &format_px(rect.left() + scroll.x))?;
        document.set_style_property(&self.proxy, "top", &format_px(rect.top() + scroll.y))?;
        document.set_style_property(&self.proxy, "width", &format_px(rect.width))?;
        document.set_style_property(&self.proxy, "height", &format_px(rect.height))?;
        Ok(())
    }

    /// Starts a drag session. Returns false when one is already running.
    pub fn pointer_down(&mut self, document: &mut D) -> Result<bool> {
        if self.session.is_some() {
            return Ok(false);
        }
        let pointer_move = document.listen(ListenTarget::Document, EventKind::PointerMove)?;
        let pointer_up = match document.listen(ListenTarget::Window, EventKind::PointerUp) {
            Ok(listener) => listener,
            Err(err) => {
                document.unlisten(pointer_move);
                return Err(err);
            }
        };
        self.session = Some(DragSession {
            pointer_move,
            pointer_up,
        });
        Ok(true)
    }

    /// Accumulates `movement` and moves both the proxy and the source.
    ///
    /// The position is a running sum of deltas, never re-derived from an
    /// absolute cursor position.
    pub fn pointer_move<G: GeometryProvider<D>>(
        &mut self,
        document: &mut D,
        geometry: &G,
        movement: Vector,
    ) -> Result<()> {
        if self.session.is_none() || movement.is_zero() {
            return Ok(());
        }
        self.position += movement;
        let offset = self.local_offset(document, geometry)?;
        document.set_attribute(&self.source, "transform", &format_translate(offset))?;

        let scroll = geometry.scroll_offset(document);
        document.set_style_property(&self.proxy, "left", &format_px(self.position.x + scroll.x))?;
        document.set_style_property(&self.proxy, "top", &format_px(self.position.y + scroll.y))?;
        Ok(())
    }

    /// Current drag displacement in the owning `<svg>`'s user units.
    ///
    /// Both the accumulated position and the origin are converted, so the
    /// offset between the source's box and its root's box cancels out and
    /// nested elements move exactly like roots.
    pub fn local_offset<G: GeometryProvider<D>>(&self, document: &D, geometry: &G) -> Result<Vector> {
        let current = screen_to_local(document, geometry, self.position, &self.source)?;
        let anchor = screen_to_local(document, geometry, self.origin, &self.source)?;
        Ok(current - anchor)
    }

    /// Ends the drag session. Returns false when there was none.
    pub fn pointer_up(&mut self, document: &mut D) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        document.unlisten(session.pointer_move);
        document.unlisten(session.pointer_up);
        true
    }

    /// Releases every listener and detaches the proxy. The source keeps
    /// whatever transform it had.
    pub fn remove(mut self, document: &mut D) -> Result<()> {
        self.pointer_up(document);
        if let Some(listener) = self.pointer_down.take() {
            document.unlisten(listener);
        }
        document.remove_node(&self.proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, NodeId};
    use crate::geometry::Matrix;
    use crate::layout::FixedGeometry;
    use pretty_assertions::assert_eq;

    const MARKUP: &str = r#"<svg id="root" width="50" height="50"><g id="face"><circle cx="10" cy="10" r="5"/></g></svg>"#;

    fn setup(ctm: Matrix) -> (MemoryDocument, FixedGeometry<NodeId>, NodeId, NodeId) {
        let doc = MemoryDocument::from_markup(MARKUP).unwrap();
        let root = doc.element_by_id("root").unwrap();
        let face = doc.element_by_id("face").unwrap();
        let geometry = FixedGeometry::new()
            .with_rect(root, Rect::new(100.0, 100.0, 50.0, 50.0))
            .with_rect(face, Rect::new(110.0, 120.0, 20.0, 20.0))
            .with_ctm(root, ctm);
        (doc, geometry, root, face)
    }

    #[test]
    fn construction_overlays_the_proxy() {
        let (mut doc, geometry, root, _) = setup(Matrix::IDENTITY);
        let controller = Controller::new(&mut doc, &geometry, root, &DragConfig::default()).unwrap();
        let proxy = *controller.proxy();

        assert!(doc.is_connected(&proxy));
        assert_eq!(doc.parent(proxy), Some(doc.body()));
        assert_eq!(
            doc.get_attribute(proxy, "style"),
            Some("cursor: pointer; position: absolute; left: 100px; top: 100px; width: 50px; height: 50px;")
        );
        assert_eq!(controller.state(), DragState::Idle);
        assert_eq!(controller.position(), Point::new(100.0, 100.0));
        assert_eq!(doc.active_listeners(), 1);
    }

    #[test]
    fn drag_moves_root_source_and_proxy() {
        let (mut doc, geometry, root, _) = setup(Matrix::IDENTITY);
        let mut controller =
            Controller::new(&mut doc, &geometry, root, &DragConfig::default()).unwrap();
        assert!(controller.pointer_down(&mut doc).unwrap());
        assert_eq!(controller.state(), DragState::Dragging);
        assert_eq!(doc.active_listeners(), 3);

        controller.pointer_move(&mut doc, &geometry, Vector::new(10.0, 0.0)).unwrap();
        controller.pointer_move(&mut doc, &geometry, Vector::new(0.0, 5.0)).unwrap();
        assert_eq!(controller.position(), Point::new(110.0, 105.0));
        assert_eq!(doc.get_attribute(root, "transform"), Some("translate(10,5)"));
        let proxy = *controller.proxy();
        assert_eq!(doc.style_property(proxy, "left").as_deref(), Some("110px"));
        assert_eq!(doc.style_property(proxy, "top").as_deref(), Some("105px"));

        assert!(controller.pointer_up(&mut doc));
        assert_eq!(controller.state(), DragState::Idle);
        assert_eq!(doc.active_listeners(), 1);
    }

    #[test]
    fn nested_source_moves_in_root_units() {
        let (mut doc, geometry, _, face) = setup(Matrix::new(2.0, 0.0, 0.0, 2.0, 100.0, 100.0));
        let mut controller =
            Controller::new(&mut doc, &geometry, face, &DragConfig::default()).unwrap();
        controller.pointer_down(&mut doc).unwrap();
        controller.pointer_move(&mut doc, &geometry, Vector::new(10.0, -4.0)).unwrap();
        assert_eq!(controller.position(), Point::new(120.0, 116.0));
        assert_eq!(doc.get_attribute(face, "transform"), Some("translate(5,-2)"));
    }

    #[test]
    fn moves_outside_a_session_are_ignored() {
        let (mut doc, geometry, root, _) = setup(Matrix::IDENTITY);
        let mut controller =
            Controller::new(&mut doc, &geometry, root, &DragConfig::default()).unwrap();
        controller.pointer_move(&mut doc, &geometry, Vector::new(10.0, 10.0)).unwrap();
        assert_eq!(controller.position(), Point::new(100.0, 100.0));
        assert_eq!(doc.get_attribute(root, "transform"), None);
        assert!(!controller.pointer_up(&mut doc));
    }

    #[test]
    fn zero_movement_leaves_transform_untouched() {
        let (mut doc, geometry, root, _) = setup(Matrix::IDENTITY);
        let mut controller =
            Controller::new(&mut doc, &geometry, root, &DragConfig::default()).unwrap();
        controller.pointer_down(&mut doc).unwrap();
        controller.pointer_move(&mut doc, &geometry, Vector::ZERO).unwrap();
        assert_eq!(doc.get_attribute(root, "transform"), None);

        controller.pointer_move(&mut doc, &geometry, Vector::new(3.0, 4.0)).unwrap();
        controller.pointer_up(&mut doc);
        controller.pointer_down(&mut doc).unwrap();
        controller.pointer_move(&mut doc, &geometry, Vector::ZERO).unwrap();
        assert_eq!(doc.get_attribute(root, "transform"), Some("translate(3,4)"));
    }

    #[test]
    fn second_pointer_down_does_not_stack_listeners() {
        let (mut doc, geometry, root, _) = setup(Matrix::IDENTITY);
        let mut controller =
            Controller::new(&mut doc, &geometry, root, &DragConfig::default()).unwrap();
        assert!(controller.pointer_down(&mut doc).unwrap());
        assert!(!controller.pointer_down(&mut doc).unwrap());
        assert_eq!(doc.active_listeners(), 3);
    }

    #[test]
    fn resize_clears_offset_and_realigns() {
        let (mut doc, mut geometry, root, _) = setup(Matrix::IDENTITY);
        let mut controller =
            Controller::new(&mut doc, &geometry, root, &DragConfig::default()).unwrap();
        controller.pointer_down(&mut doc).unwrap();
        controller.pointer_move(&mut doc, &geometry, Vector::new(7.0, 7.0)).unwrap();

        geometry.set_rect(root, Rect::new(40.0, 60.0, 25.0, 25.0));
        controller.resize(&mut doc, &geometry).unwrap();
        assert_eq!(doc.get_attribute(root, "transform"), None);
        assert_eq!(controller.position(), Point::new(40.0, 60.0));
        let proxy = *controller.proxy();
        assert_eq!(doc.style_property(proxy, "width").as_deref(), Some("25px"));
        // the session survives a resize
        assert_eq!(controller.state(), DragState::Dragging);
    }

    #[test]
    fn remove_releases_listeners_and_keeps_transform() {
        let (mut doc, geometry, root, _) = setup(Matrix::IDENTITY);
        let mut controller =
            Controller::new(&mut doc, &geometry, root, &DragConfig::default()).unwrap();
        controller.pointer_down(&mut doc).unwrap();
        controller.pointer_move(&mut doc, &geometry, Vector::new(2.0, 0.0)).unwrap();
        let proxy = *controller.proxy();
        controller.remove(&mut doc).unwrap();

        assert_eq!(doc.active_listeners(), 0);
        assert!(!doc.is_connected(&proxy));
        assert_eq!(doc.get_attribute(root, "transform"), Some("translate(2,0)"));
    }

    #[test]
    fn failed_construction_leaves_no_proxy_behind() {
        let (mut doc, _, root, face) = setup(Matrix::IDENTITY);
        // the face has no layout box
        let geometry = FixedGeometry::new()
            .with_rect(root, Rect::new(0.0, 0.0, 50.0, 50.0))
            .with_ctm(root, Matrix::IDENTITY);
        assert!(Controller::new(&mut doc, &geometry, face, &DragConfig::default()).is_err());
        let body = doc.body();
        assert_eq!(doc.children(body).len(), 1);
        assert_eq!(doc.active_listeners(), 0);
    }

    #[test]
    fn proxy_drops_markers_of_nested_sources() {
        let mut doc = MemoryDocument::from_markup(
            r#"<svg id="root" width="50" height="50"><g id="inner" data-draggable=""><rect width="5" height="5"/></g></svg>"#,
        )
        .unwrap();
        let root = doc.element_by_id("root").unwrap();
        let geometry = FixedGeometry::new()
            .with_rect(root, Rect::new(0.0, 0.0, 50.0, 50.0))
            .with_ctm(root, Matrix::IDENTITY);
        let controller = Controller::new(&mut doc, &geometry, root, &DragConfig::default()).unwrap();
        let proxy = *controller.proxy();
        assert!(doc.find_marked(&proxy, "data-draggable").unwrap().is_empty());
        let inner = doc.element_by_id("inner").unwrap();
        assert!(doc.has_attribute(inner, "data-draggable"));
    }

    #[test]
    fn scroll_offset_moves_proxy_into_page_coordinates() {
        let (mut doc, mut geometry, root, _) = setup(Matrix::IDENTITY);
        geometry.set_scroll(Vector::new(0.0, 300.0));
        let controller = Controller::new(&mut doc, &geometry, root, &DragConfig::default()).unwrap();
        let proxy = *controller.proxy();
        assert_eq!(doc.style_property(proxy, "top").as_deref(), Some("400px"));
        assert_eq!(controller.position(), Point::new(100.0, 100.0));
    }
}
