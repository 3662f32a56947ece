//! Pin overlay contract for the page renderer.
//!
//! Pins are numbered markers placed over the bill at percentage
//! coordinates. Errors and savings are numbered independently.

use serde::Serialize;

use crate::pipeline::analysis::AnalysisRecord;

/// Closest a marker may sit to a page edge, in percent.
pub const PIN_DISPLAY_MIN: f64 = 3.0;
pub const PIN_DISPLAY_MAX: f64 = 97.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinKind {
    Error,
    Saving,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    /// 1-based, unique within its kind.
    pub id: u32,
    pub page_number: u32,
    pub pin_x: f64,
    pub pin_y: f64,
    /// Where to draw the marker, kept inside the page margins.
    pub display_x: f64,
    pub display_y: f64,
    #[serde(rename = "type")]
    pub kind: PinKind,
}

impl Pin {
    fn new(kind: PinKind, id: u32, page_number: u32, pin_x: f64, pin_y: f64) -> Self {
        Self {
            id,
            page_number,
            pin_x,
            pin_y,
            display_x: clamp_display(pin_x),
            display_y: clamp_display(pin_y),
            kind,
        }
    }

    pub fn display_position(&self) -> (f64, f64) {
        (self.display_x, self.display_y)
    }
}

/// Pins to overlay on one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOverlay {
    pub page_number: u32,
    pub pins: Vec<Pin>,
}

fn clamp_display(coord: f64) -> f64 {
    coord.clamp(PIN_DISPLAY_MIN, PIN_DISPLAY_MAX)
}

/// Issues first, then savings tips, each in record order.
pub fn build_pins(record: &AnalysisRecord) -> Vec<Pin> {
    let errors = record
        .error_analysis
        .suspected_issues
        .iter()
        .zip(1u32..)
        .map(|(issue, id)| Pin::new(PinKind::Error, id, issue.page_number, issue.pin_x, issue.pin_y));

    let savings = record
        .savings_tips
        .iter()
        .zip(1u32..)
        .map(|(tip, id)| Pin::new(PinKind::Saving, id, tip.page_number, tip.pin_x, tip.pin_y));

    errors.chain(savings).collect()
}

/// Page holding the given pin, or page 1 when there is no such pin.
pub fn page_for_pin(pins: &[Pin], kind: PinKind, id: u32) -> u32 {
    pins.iter()
        .find(|p| p.kind == kind && p.id == id)
        .map(|p| p.page_number)
        .unwrap_or(1)
}

pub fn pins_on_page(pins: &[Pin], page: u32) -> Vec<&Pin> {
    pins.iter().filter(|p| p.page_number == page).collect()
}

/// One overlay per page that carries pins, in page order.
pub fn page_overlays(pins: &[Pin]) -> Vec<PageOverlay> {
    let mut pages: Vec<u32> = pins.iter().map(|p| p.page_number).collect();
    pages.sort_unstable();
    pages.dedup();

    pages
        .into_iter()
        .map(|page_number| PageOverlay {
            page_number,
            pins: pins_on_page(pins, page_number).into_iter().cloned().collect(),
        })
        .collect()
}
