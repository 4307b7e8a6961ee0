//! Map viewport control
//!
//! The map itself is supplied by the host through [`MapSurface`]. The
//! [`ViewportController`] owns it and layers the framing and
//! interaction-lock rules on top.

mod controller;

pub use controller::{InteractionOwner, ViewportController};

use crate::geo::{Bounds, LatLng};

/// User interaction modes a map can have switched on or off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionMode {
    Drag,
    TouchZoom,
    DoubleClickZoom,
    ScrollWheelZoom,
    BoxZoom,
    Keyboard,
}

impl InteractionMode {
    pub const ALL: [InteractionMode; 6] = [
        InteractionMode::Drag,
        InteractionMode::TouchZoom,
        InteractionMode::DoubleClickZoom,
        InteractionMode::ScrollWheelZoom,
        InteractionMode::BoxZoom,
        InteractionMode::Keyboard,
    ];
}

/// Handle for a marker placed on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(pub u64);

/// Host map widget
pub trait MapSurface {
    /// Whether the map has finished initializing and can be framed
    fn is_ready(&self) -> bool;

    /// Animate the view so `bounds` fits with `padding_px` margin on each side
    fn fit_bounds(&mut self, bounds: Bounds, padding_px: u32);

    fn interaction_enabled(&self, mode: InteractionMode) -> bool;

    fn set_interaction(&mut self, mode: InteractionMode, enabled: bool);

    /// Place the moving marker, rotated clockwise from north by `rotation_deg`
    fn add_marker(&mut self, position: LatLng, rotation_deg: f64) -> MarkerId;

    fn move_marker(&mut self, marker: MarkerId, position: LatLng, rotation_deg: f64);

    fn remove_marker(&mut self, marker: MarkerId);

    fn has_zoom_control(&self) -> bool;

    fn add_zoom_control(&mut self);

    fn remove_zoom_control(&mut self);
}
