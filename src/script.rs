//! Replays scripted pointer input against a page loaded into memory.

use crate::config::DragConfig;
use crate::controller::PointerEvent;
use crate::dom::{Document, MemoryDocument, NodeId};
use crate::error::{DragError, Result};
use crate::geometry::{Point, Vector};
use crate::layout::SvgLayout;
use crate::registry::DragManager;
use crate::throttle::ManualClock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    /// Press on the proxy of the source with this id.
    Down { element: String },
    Move { dx: f64, dy: f64 },
    Up,
    Resize {
        #[serde(default, rename = "advanceMs")]
        advance_ms: u64,
    },
    Wait { ms: u64 },
    Scroll { x: f64, y: f64 },
    Scan,
    Reload,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerReport {
    pub source: String,
    pub state: &'static str,
    pub position: Point,
    pub transform: Option<String>,
    pub proxy_style: Option<String>,
    pub view_box: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub controllers: Vec<ControllerReport>,
    pub ignored_events: usize,
    pub dropped_resizes: usize,
}

pub type Simulation = DragManager<MemoryDocument, SvgLayout, ManualClock>;

pub fn simulation(markup: &str, layout: SvgLayout, config: DragConfig) -> Result<Simulation> {
    let document = MemoryDocument::from_markup(markup)?;
    Ok(DragManager::with_clock(
        document,
        layout,
        config,
        ManualClock::new(),
    ))
}

/// Loads `markup`, initializes a manager and plays `script` against it.
pub fn run_script(
    markup: &str,
    layout: SvgLayout,
    config: DragConfig,
    script: &Script,
) -> Result<SimulationReport> {
    let mut manager = simulation(markup, layout, config)?;
    manager.initialize()?;

    let mut ignored_events = 0;
    let mut dropped_resizes = 0;
    for step in &script.steps {
        match step {
            Step::Down { element } => {
                let source = manager
                    .document()
                    .element_by_id(element)
                    .ok_or_else(|| DragError::UnknownElement(element.clone()))?;
                let Some(proxy) = manager.controller_for(&source).map(|c| *c.proxy()) else {
                    ignored_events += 1;
                    continue;
                };
                if !manager.dispatch(PointerEvent::Down { target: proxy })?.handled {
                    ignored_events += 1;
                }
            }
            Step::Move { dx, dy } => {
                let movement = Vector::new(*dx, *dy);
                if !manager.dispatch(PointerEvent::Move { movement })?.handled {
                    ignored_events += 1;
                }
            }
            Step::Up => {
                if !manager.dispatch(PointerEvent::Up)?.handled {
                    ignored_events += 1;
                }
            }
            Step::Resize { advance_ms } => {
                manager.clock().advance(Duration::from_millis(*advance_ms));
                if !manager.on_resize()? {
                    dropped_resizes += 1;
                }
            }
            Step::Wait { ms } => manager.clock().advance(Duration::from_millis(*ms)),
            Step::Scroll { x, y } => manager.geometry_mut().set_scroll(Vector::new(*x, *y)),
            Step::Scan => {
                let body = manager.document().body();
                manager.activate(&body)?;
            }
            Step::Reload => {
                manager.initialize()?;
            }
        }
    }

    let mut report = report(&manager);
    report.ignored_events = ignored_events;
    report.dropped_resizes = dropped_resizes;
    Ok(report)
}

pub fn report(manager: &Simulation) -> SimulationReport {
    let doc = manager.document();
    let controllers = manager
        .controllers()
        .iter()
        .map(|controller| {
            let source = *controller.source();
            let proxy = *controller.proxy();
            ControllerReport {
                source: node_label(doc, source),
                state: controller.state().as_str(),
                position: controller.position(),
                transform: doc.get_attribute(source, "transform").map(str::to_string),
                proxy_style: doc.get_attribute(proxy, "style").map(str::to_string),
                view_box: doc.get_attribute(proxy, "viewBox").map(str::to_string),
            }
        })
        .collect();
    SimulationReport {
        controllers,
        ignored_events: 0,
        dropped_resizes: 0,
    }
}

fn node_label(doc: &MemoryDocument, node: NodeId) -> String {
    match doc.get_attribute(node, "id") {
        Some(id) => id.to_string(),
        None => format!("{}#{}", doc.tag(node).unwrap_or("node"), node.index()),
    }
}
