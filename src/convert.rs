//! Screen/user-space conversion and proxy isolation.

use crate::dom::Document;
use crate::error::{DragError, Result};
use crate::geometry::{Point, Rect, format_number, format_view_box};
use crate::layout::GeometryProvider;

/// The `<svg>` whose user space `node` lives in: the node itself when it is
/// an `<svg>`, otherwise its nearest `<svg>` ancestor.
pub fn owner_svg<D: Document>(document: &D, node: &D::Node) -> Result<D::Node> {
    if document.is_svg(node) {
        return Ok(node.clone());
    }
    document.owner_svg(node).ok_or(DragError::NoOwnerSvg)
}

/// Converts a viewport point into the user space of `reference`'s owning `<svg>`.
///
/// The screen CTM is looked up on every call; scrolling or responsive layout
/// can change it between two pointer moves.
pub fn screen_to_local<D, G>(
    document: &D,
    geometry: &G,
    point: Point,
    reference: &D::Node,
) -> Result<Point>
where
    D: Document,
    G: GeometryProvider<D>,
{
    let owner = owner_svg(document, reference)?;
    let ctm = geometry
        .screen_ctm(document, &owner)
        .ok_or(DragError::MissingScreenCtm)?;
    let inverse = ctm.inverse().ok_or(DragError::SingularTransform)?;
    Ok(inverse.apply(point))
}

pub fn local_to_screen<D, G>(
    document: &D,
    geometry: &G,
    point: Point,
    reference: &D::Node,
) -> Result<Point>
where
    D: Document,
    G: GeometryProvider<D>,
{
    let owner = owner_svg(document, reference)?;
    let ctm = geometry
        .screen_ctm(document, &owner)
        .ok_or(DragError::MissingScreenCtm)?;
    Ok(ctm.apply(point))
}

/// The region of the owning `<svg>`'s user space that `source` covers on screen.
pub fn isolation_view_box<D, G>(document: &D, geometry: &G, source: &D::Node) -> Result<Rect>
where
    D: Document,
    G: GeometryProvider<D>,
{
    let rect = geometry
        .bounding_client_rect(document, source)
        .ok_or(DragError::NoLayoutBox)?;
    let top_left = screen_to_local(document, geometry, rect.top_left(), source)?;
    let bottom_right = screen_to_local(document, geometry, rect.bottom_right(), source)?;
    Ok(Rect::new(
        top_left.x,
        top_left.y,
        bottom_right.x - top_left.x,
        bottom_right.y - top_left.y,
    ))
}

/// Builds a detached, standalone `<svg>` that renders `source` at 1:1 scale.
///
/// The owning root is cloned without children and without `class`, sized to
/// the source's rendered width, and given a viewBox covering exactly the
/// source's visible region; a deep clone of the source is its only child.
pub fn isolate<D, G>(document: &mut D, geometry: &G, source: &D::Node) -> Result<D::Node>
where
    D: Document,
    G: GeometryProvider<D>,
{
    let rect = geometry
        .bounding_client_rect(document, source)
        .ok_or(DragError::NoLayoutBox)?;
    let view_box = isolation_view_box(document, geometry, source)?;
    let owner = owner_svg(document, source)?;

    let outer = document.clone_node(&owner, false)?;
    document.remove_attribute(&outer, "class")?;
    document.set_attribute(&outer, "width", &format_number(rect.width))?;
    document.set_attribute(&outer, "viewBox", &format_view_box(&view_box))?;
    let inner = document.clone_node(source, true)?;
    document.append_child(&outer, &inner)?;
    Ok(outer)
}
