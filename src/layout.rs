//! Screen geometry for document nodes.
//!
//! [`GeometryProvider`] answers the two questions the drag math needs:
//! where a node sits on screen and how its owning `<svg>` maps user units
//! to screen pixels. Browsers answer from their render tree; [`SvgLayout`]
//! derives the same answers statically from SVG attributes.

use crate::dom::{Document, MemoryDocument, NodeId};
use crate::geometry::{
    Matrix, Point, Rect, Vector, parse_length, parse_number_list, parse_transform, parse_view_box,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::hash::Hash;

static PATH_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[MmLlHhVvCcSsQqTtAaZz]|[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").unwrap()
});

const DEFAULT_VIEWPORT_WIDTH: f64 = 300.0;
const DEFAULT_VIEWPORT_HEIGHT: f64 = 150.0;

pub trait GeometryProvider<D: Document> {
    /// Viewport-relative border box, like `getBoundingClientRect()`.
    fn bounding_client_rect(&self, document: &D, node: &D::Node) -> Option<Rect>;
    /// User space of `svg` to viewport pixels, like `getScreenCTM()`.
    fn screen_ctm(&self, document: &D, svg: &D::Node) -> Option<Matrix>;
    fn scroll_offset(&self, _document: &D) -> Vector {
        Vector::ZERO
    }
}

/// Geometry with injected rectangles and matrices, keyed by node.
#[derive(Debug, Clone)]
pub struct FixedGeometry<N> {
    rects: HashMap<N, Rect>,
    ctms: HashMap<N, Matrix>,
    scroll: Vector,
}

impl<N: Eq + Hash> Default for FixedGeometry<N> {
    fn default() -> Self {
        Self {
            rects: HashMap::new(),
            ctms: HashMap::new(),
            scroll: Vector::ZERO,
        }
    }
}

impl<N: Eq + Hash> FixedGeometry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rect(&mut self, node: N, rect: Rect) {
        self.rects.insert(node, rect);
    }

    pub fn set_ctm(&mut self, svg: N, ctm: Matrix) {
        self.ctms.insert(svg, ctm);
    }

    pub fn set_scroll(&mut self, scroll: Vector) {
        self.scroll = scroll;
    }

    pub fn with_rect(mut self, node: N, rect: Rect) -> Self {
        self.set_rect(node, rect);
        self
    }

    pub fn with_ctm(mut self, svg: N, ctm: Matrix) -> Self {
        self.set_ctm(svg, ctm);
        self
    }
}

impl<D> GeometryProvider<D> for FixedGeometry<D::Node>
where
    D: Document,
    D::Node: Eq + Hash,
{
    fn bounding_client_rect(&self, _document: &D, node: &D::Node) -> Option<Rect> {
        self.rects.get(node).copied()
    }

    fn screen_ctm(&self, _document: &D, svg: &D::Node) -> Option<Matrix> {
        self.ctms.get(svg).copied()
    }

    fn scroll_offset(&self, _document: &D) -> Vector {
        self.scroll
    }
}

/// Static layout of a [`MemoryDocument`].
///
/// Outermost `<svg>` elements are stacked top to bottom in document order
/// starting at `origin` (page coordinates), separated by `gap`. Elements
/// styled `position: absolute` leave the flow and sit at their `left`/`top`.
/// An outermost `<svg>`'s `transform` is applied inside its viewBox, so a
/// translation written in user units moves the whole viewport by the
/// matching number of pixels. Everything is recomputed on each query, so
/// attribute changes (including drag transforms) are reflected immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgLayout {
    pub origin: Point,
    pub gap: f64,
    pub scroll: Vector,
}

impl Default for SvgLayout {
    fn default() -> Self {
        Self {
            origin: Point::ZERO,
            gap: 0.0,
            scroll: Vector::ZERO,
        }
    }
}

impl SvgLayout {
    pub fn new(origin: Point) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    pub fn set_scroll(&mut self, scroll: Vector) {
        self.scroll = scroll;
    }

    fn is_out_of_flow(doc: &MemoryDocument, node: NodeId) -> bool {
        matches!(
            doc.style_property(node, "position").as_deref(),
            Some("absolute") | Some("fixed")
        )
    }

    fn outermost_svgs(doc: &MemoryDocument) -> Vec<NodeId> {
        doc.descendants(doc.body())
            .into_iter()
            .filter(|node| doc.tag(*node) == Some("svg") && doc.owner_svg(node).is_none())
            .collect()
    }

    /// Top-left of an outermost `<svg>` in viewport coordinates.
    fn placement(&self, doc: &MemoryDocument, svg: NodeId) -> Point {
        if Self::is_out_of_flow(doc, svg) {
            let left = style_length(doc, svg, "left").unwrap_or(0.0);
            let top = style_length(doc, svg, "top").unwrap_or(0.0);
            return Point::new(left, top) - self.scroll;
        }
        let mut y = self.origin.y;
        for root in Self::outermost_svgs(doc) {
            if root == svg {
                break;
            }
            if Self::is_out_of_flow(doc, root) {
                continue;
            }
            y += viewport_size(doc, root).1 + self.gap;
        }
        Point::new(self.origin.x, y) - self.scroll
    }

    /// Maps the user space established by `node` (after its own transform,
    /// or inside its viewBox for `<svg>`) to the viewport.
    fn user_space_ctm(&self, doc: &MemoryDocument, node: NodeId) -> Option<Matrix> {
        if doc.tag(node) == Some("svg") {
            return self.svg_ctm(doc, node);
        }
        let parent = doc.parent(node)?;
        let parent_ctm = self.user_space_ctm(doc, parent)?;
        Some(parent_ctm.multiply(&own_transform(doc, node)))
    }

    fn svg_ctm(&self, doc: &MemoryDocument, svg: NodeId) -> Option<Matrix> {
        let (width, height) = viewport_size(doc, svg);
        let content = view_box_transform(doc, svg, width, height);
        match doc.owner_svg(&svg) {
            None => {
                // an outermost <svg>'s own transform acts in its user space
                let placement = self.placement(doc, svg);
                Some(
                    Matrix::translate(placement.x, placement.y)
                        .multiply(&content)
                        .multiply(&own_transform(doc, svg)),
                )
            }
            Some(_) => {
                let parent = doc.parent(svg)?;
                let parent_ctm = self.user_space_ctm(doc, parent)?;
                let x = attr_number(doc, svg, "x").unwrap_or(0.0);
                let y = attr_number(doc, svg, "y").unwrap_or(0.0);
                Some(
                    parent_ctm
                        .multiply(&own_transform(doc, svg))
                        .multiply(&Matrix::translate(x, y))
                        .multiply(&content),
                )
            }
        }
    }

    /// Bounds of `node` in its parent's user space.
    fn bounds_in_parent(&self, doc: &MemoryDocument, node: NodeId) -> Option<Rect> {
        let transform = own_transform(doc, node);
        if doc.tag(node) == Some("svg") {
            let (width, height) = viewport_size(doc, node);
            let x = attr_number(doc, node, "x").unwrap_or(0.0);
            let y = attr_number(doc, node, "y").unwrap_or(0.0);
            return Some(transform.map_rect(&Rect::new(x, y, width, height)));
        }
        let local = self.local_bbox(doc, node)?;
        Some(transform.map_rect(&local))
    }

    /// Bounds of `node` in its own user space, before its transform.
    fn local_bbox(&self, doc: &MemoryDocument, node: NodeId) -> Option<Rect> {
        let tag = doc.tag(node)?;
        let num = |name: &str| attr_number(doc, node, name).unwrap_or(0.0);
        match tag {
            "rect" | "image" | "use" | "foreignObject" => {
                Some(Rect::new(num("x"), num("y"), num("width"), num("height")))
            }
            "circle" => {
                let r = num("r");
                Some(Rect::new(num("cx") - r, num("cy") - r, 2.0 * r, 2.0 * r))
            }
            "ellipse" => {
                let (rx, ry) = (num("rx"), num("ry"));
                Some(Rect::new(num("cx") - rx, num("cy") - ry, 2.0 * rx, 2.0 * ry))
            }
            "line" => Some(Rect::from_corners(
                Point::new(num("x1"), num("y1")),
                Point::new(num("x2"), num("y2")),
            )),
            "polyline" | "polygon" => {
                let values = parse_number_list(doc.get_attribute(node, "points")?);
                let points: Vec<Point> = values
                    .chunks_exact(2)
                    .map(|pair| Point::new(pair[0], pair[1]))
                    .collect();
                Rect::from_points(&points)
            }
            "path" => Rect::from_points(&path_points(doc.get_attribute(node, "d")?)),
            "g" | "a" | "switch" | "svg" => doc
                .element_children(node)
                .filter_map(|child| self.bounds_in_parent(doc, child))
                .reduce(|acc, rect| acc.union(&rect)),
            _ => None,
        }
    }
}

impl GeometryProvider<MemoryDocument> for SvgLayout {
    fn bounding_client_rect(&self, doc: &MemoryDocument, node: &NodeId) -> Option<Rect> {
        let node = *node;
        if !doc.is_connected(&node) {
            return None;
        }
        if doc.tag(node) == Some("svg") && doc.owner_svg(&node).is_none() {
            let (width, height) = viewport_size(doc, node);
            let placement = self.placement(doc, node);
            let mut frame = Matrix::translate(placement.x, placement.y);
            let own = own_transform(doc, node);
            if !own.is_identity() {
                let content = view_box_transform(doc, node, width, height);
                frame = match content.inverse() {
                    Some(inverse) => frame.multiply(&content).multiply(&own).multiply(&inverse),
                    None => frame.multiply(&own),
                };
            }
            return Some(frame.map_rect(&Rect::new(0.0, 0.0, width, height)));
        }
        let parent = doc.parent(node)?;
        let parent_ctm = self.user_space_ctm(doc, parent)?;
        let bounds = self.bounds_in_parent(doc, node)?;
        Some(parent_ctm.map_rect(&bounds))
    }

    fn screen_ctm(&self, doc: &MemoryDocument, svg: &NodeId) -> Option<Matrix> {
        if !doc.is_connected(svg) {
            return None;
        }
        self.svg_ctm(doc, *svg)
    }

    fn scroll_offset(&self, _doc: &MemoryDocument) -> Vector {
        self.scroll
    }
}

fn attr_number(doc: &MemoryDocument, node: NodeId, name: &str) -> Option<f64> {
    doc.get_attribute(node, name).and_then(parse_length)
}

fn style_length(doc: &MemoryDocument, node: NodeId, property: &str) -> Option<f64> {
    doc.style_property(node, property)
        .as_deref()
        .and_then(parse_length)
}

fn own_transform(doc: &MemoryDocument, node: NodeId) -> Matrix {
    doc.get_attribute(node, "transform")
        .and_then(parse_transform)
        .unwrap_or(Matrix::IDENTITY)
}

/// Rendered size of an `<svg>` viewport. CSS width/height win over attributes;
/// a missing dimension follows the viewBox aspect ratio.
fn viewport_size(doc: &MemoryDocument, svg: NodeId) -> (f64, f64) {
    let width = style_length(doc, svg, "width").or_else(|| attr_number(doc, svg, "width"));
    let height = style_length(doc, svg, "height").or_else(|| attr_number(doc, svg, "height"));
    let view_box = doc.get_attribute(svg, "viewBox").and_then(parse_view_box);
    match (width, height, view_box) {
        (Some(w), Some(h), _) => (w, h),
        (Some(w), None, Some(vb)) => (w, w * vb.height / vb.width),
        (None, Some(h), Some(vb)) => (h * vb.width / vb.height, h),
        (None, None, Some(vb)) => (
            DEFAULT_VIEWPORT_WIDTH,
            DEFAULT_VIEWPORT_WIDTH * vb.height / vb.width,
        ),
        (Some(w), None, None) => (w, DEFAULT_VIEWPORT_HEIGHT),
        (None, Some(h), None) => (DEFAULT_VIEWPORT_WIDTH, h),
        (None, None, None) => (DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Min,
    Mid,
    Max,
}

fn view_box_transform(doc: &MemoryDocument, svg: NodeId, width: f64, height: f64) -> Matrix {
    let Some(vb) = doc.get_attribute(svg, "viewBox").and_then(parse_view_box) else {
        return Matrix::IDENTITY;
    };
    let ratio = doc
        .get_attribute(svg, "preserveAspectRatio")
        .unwrap_or("xMidYMid meet");
    let mut parts = ratio.split_whitespace();
    let align = parts.next().unwrap_or("xMidYMid");
    let slice = parts.next() == Some("slice");

    let sx = width / vb.width;
    let sy = height / vb.height;
    if align == "none" {
        return Matrix::new(sx, 0.0, 0.0, sy, -vb.x * sx, -vb.y * sy);
    }

    let (align_x, align_y) = parse_align(align);
    let scale = if slice { sx.max(sy) } else { sx.min(sy) };
    let mut tx = -vb.x * scale;
    let mut ty = -vb.y * scale;
    let spare_x = width - vb.width * scale;
    let spare_y = height - vb.height * scale;
    tx += match align_x {
        Align::Min => 0.0,
        Align::Mid => spare_x / 2.0,
        Align::Max => spare_x,
    };
    ty += match align_y {
        Align::Min => 0.0,
        Align::Mid => spare_y / 2.0,
        Align::Max => spare_y,
    };
    Matrix::new(scale, 0.0, 0.0, scale, tx, ty)
}

fn parse_align(value: &str) -> (Align, Align) {
    let pick = |token: &str| match token {
        "Min" => Align::Min,
        "Max" => Align::Max,
        _ => Align::Mid,
    };
    // xMinYMax -> ("Min", "Max")
    if value.len() == 8 && value.starts_with('x') && value[4..].starts_with('Y') {
        (pick(&value[1..4]), pick(&value[5..8]))
    } else {
        (Align::Mid, Align::Mid)
    }
}

/// End and control points of path data. Curve bounds are approximated by
/// their control polygon; arcs contribute their end points.
fn path_points(d: &str) -> Vec<Point> {
    let mut segments: Vec<(char, Vec<f64>)> = Vec::new();
    for token in PATH_TOKEN_RE.find_iter(d) {
        let text = token.as_str();
        let first = text.chars().next().unwrap_or('0');
        if first.is_ascii_alphabetic() {
            segments.push((first, Vec::new()));
        } else if let (Some(segment), Ok(value)) = (segments.last_mut(), text.parse::<f64>()) {
            segment.1.push(value);
        }
    }

    let mut points = Vec::new();
    let mut current = Point::ZERO;
    let mut start = Point::ZERO;
    for (command, args) in segments {
        let relative = command.is_ascii_lowercase();
        let resolve = |base: Point, x: f64, y: f64| {
            if relative {
                base + Vector::new(x, y)
            } else {
                Point::new(x, y)
            }
        };
        match command.to_ascii_uppercase() {
            'M' => {
                for (idx, pair) in args.chunks_exact(2).enumerate() {
                    current = resolve(current, pair[0], pair[1]);
                    if idx == 0 {
                        start = current;
                    }
                    points.push(current);
                }
            }
            'L' | 'T' => {
                for pair in args.chunks_exact(2) {
                    current = resolve(current, pair[0], pair[1]);
                    points.push(current);
                }
            }
            'H' => {
                for x in args {
                    current.x = if relative { current.x + x } else { x };
                    points.push(current);
                }
            }
            'V' => {
                for y in args {
                    current.y = if relative { current.y + y } else { y };
                    points.push(current);
                }
            }
            'C' => {
                for chunk in args.chunks_exact(6) {
                    let base = current;
                    points.push(resolve(base, chunk[0], chunk[1]));
                    points.push(resolve(base, chunk[2], chunk[3]));
                    current = resolve(base, chunk[4], chunk[5]);
                    points.push(current);
                }
            }
            'S' | 'Q' => {
                for chunk in args.chunks_exact(4) {
                    let base = current;
                    points.push(resolve(base, chunk[0], chunk[1]));
                    current = resolve(base, chunk[2], chunk[3]);
                    points.push(current);
                }
            }
            'A' => {
                for chunk in args.chunks_exact(7) {
                    current = resolve(current, chunk[5], chunk[6]);
                    points.push(current);
                }
            }
            'Z' => current = start,
            _ => {}
        }
    }
    points
}
