//! Cached HUD bars.
//!
//! Each bar (top: LAT/LON/OVER, bottom: ALT/VEL/AGE) lives in its own
//! pre-rendered RGB565 patch. [`HudCompositor::update`] quantizes the incoming
//! telemetry to display resolution and only formats and re-renders the cells
//! whose displayed value actually changed. [`HudCompositor::patch_into`] then
//! copies both patches into the working frame with two `copy_from_slice`
//! calls.
//!
//! # Dirty Tracking
//!
//! Quantized keys are compared rather than formatted strings, so a cache hit
//! costs six integer comparisons and no formatting at all. The same key drives
//! both the comparison and the text, which keeps the cached patch and the
//! displayed values from drifting apart.

use embedded_graphics::{
    prelude::*,
    primitives::{Line, PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use heapless::String;
use micromath::F32Ext;

use crate::config::{BAR_BYTES, BOTTOM_BAR_OFFSET, FRAME_BYTES, SCREEN_WIDTH, TOP_BAR_HEIGHT};
use crate::format::{push_age, push_grouped, push_hundredths};
use crate::geography::{REGION_NAMES, region_index};
use crate::projection::GeoPoint;
use crate::raster::Raster;
use crate::styles::{Bar, CELLS_PER_BAR, FIELD_COUNT, Field, HudTheme, ResolvedStyles};

/// Capacity of one formatted value.
const VALUE_CAP: usize = 16;

/// Cell widths per bar; the last cell takes the remaining width.
const CELL_WIDTHS: [[u32; CELLS_PER_BAR - 1]; 2] = [[85, 100], [85, 115]];

/// Everything the HUD shows for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Telemetry {
    pub position: GeoPoint,
    pub altitude_km: f32,
    pub speed_kmh: f32,
    /// Seconds since the last successful fix.
    pub age_secs: u32,
}

// =============================================================================
// Quantization
// =============================================================================

/// Display-resolution key for one field. Equal keys render identical text.
fn quantize(
    field: Field,
    t: &Telemetry,
) -> i32 {
    match field {
        Field::Lat => F32Ext::round(t.position.lat * 100.0) as i32,
        Field::Lon => F32Ext::round(t.position.lon * 100.0) as i32,
        Field::Over => region_index(t.position.lat, t.position.lon) as i32,
        Field::Alt => F32Ext::round(t.altitude_km.max(0.0)) as i32,
        Field::Vel => F32Ext::round(t.speed_kmh.max(0.0)) as i32,
        Field::Age => age_key(t.age_secs),
    }
}

/// Ages collapse to the unit `push_age` prints.
const fn age_key(secs: u32) -> i32 {
    let bucket = if secs < 60 {
        secs
    } else if secs < 3600 {
        60 + secs / 60
    } else {
        // Offset keeps hour buckets disjoint from minute buckets
        120 + secs / 3600
    };
    bucket as i32
}

fn format_key(
    field: Field,
    key: i32,
    out: &mut String<VALUE_CAP>,
) {
    out.clear();
    match field {
        Field::Lat | Field::Lon => push_hundredths(out, key),
        Field::Over => {
            let name = REGION_NAMES.get(key as usize).copied().unwrap_or("?");
            out.push_str(name).ok();
        }
        Field::Alt | Field::Vel => push_grouped(out, key.max(0) as u32),
        Field::Age => push_age(out, age_secs_from_key(key)),
    }
}

/// Smallest age that maps to `key`.
const fn age_secs_from_key(key: i32) -> u32 {
    let key = if key < 0 { 0 } else { key as u32 };
    if key < 60 {
        key
    } else if key < 120 {
        (key - 60) * 60
    } else {
        (key - 120) * 3600
    }
}

// =============================================================================
// Layout
// =============================================================================

/// Screen rectangle of a field's cell within its bar patch (excludes borders and dividers).
pub fn cell_rect(field: Field) -> Rectangle {
    let bar = field.bar();
    let widths = CELL_WIDTHS[bar.index()];
    let slot = field.slot();

    let mut x = 0;
    for w in widths.iter().take(slot) {
        x += w;
    }
    let width = if slot < CELLS_PER_BAR - 1 { widths[slot] } else { SCREEN_WIDTH - x };

    // Dividers occupy the first column of every cell but the first
    let (x, width) = if slot > 0 { (x + 1, width - 1) } else { (x, width) };
    // Border row sits on the edge facing the globe
    let y = match bar {
        Bar::Top => 0,
        Bar::Bottom => 1,
    };
    Rectangle::new(Point::new(x as i32, y), Size::new(width, TOP_BAR_HEIGHT - 1))
}

// =============================================================================
// Compositor
// =============================================================================

/// HUD overlay with per-bar cached patches.
pub struct HudCompositor {
    styles: ResolvedStyles,
    patches: [[u8; BAR_BYTES]; 2],
    keys: [Option<i32>; FIELD_COUNT],
    values: [String<VALUE_CAP>; FIELD_COUNT],
    dirty: bool,
    format_calls: u32,
    render_calls: u32,
}

impl HudCompositor {
    /// Resolve the theme and draw the static bar chrome.
    ///
    /// No field has a value yet, so the first [`update`](Self::update) renders every cell.
    pub fn new(theme: &HudTheme) -> Self {
        let mut hud = Self {
            styles: theme.resolve(),
            patches: [[0; BAR_BYTES]; 2],
            keys: [None; FIELD_COUNT],
            values: [const { String::new() }; FIELD_COUNT],
            dirty: true,
            format_calls: 0,
            render_calls: 0,
        };
        for bar in Bar::ALL {
            hud.draw_chrome(bar);
        }
        hud
    }

    fn raster(
        &mut self,
        bar: Bar,
    ) -> Raster<'_> {
        Raster::from_bar(&mut self.patches[bar.index()])
    }

    fn draw_chrome(
        &mut self,
        bar: Bar,
    ) {
        let background = self.styles.background;
        let border = PrimitiveStyle::with_stroke(self.styles.border(bar), 1);
        let last_row = TOP_BAR_HEIGHT as i32 - 1;
        let edge_y = match bar {
            Bar::Top => last_row,
            Bar::Bottom => 0,
        };
        let mut raster = self.raster(bar);
        raster.clear_buffer(background);

        Line::new(Point::new(0, edge_y), Point::new(SCREEN_WIDTH as i32 - 1, edge_y))
            .into_styled(border)
            .draw(&mut raster)
            .ok();

        // Vertical dividers, inset from the outer edges
        let mut x = 0;
        for w in CELL_WIDTHS[bar.index()] {
            x += w as i32;
            Line::new(Point::new(x, 8), Point::new(x, last_row - 8))
                .into_styled(border)
                .draw(&mut raster)
                .ok();
        }
    }

    /// Compare `telemetry` against the displayed values and re-render changed cells.
    ///
    /// Returns whether anything changed.
    pub fn update(
        &mut self,
        telemetry: &Telemetry,
    ) -> bool {
        let mut changed = false;
        for field in Field::ALL {
            let key = quantize(field, telemetry);
            if self.keys[field.index()] == Some(key) {
                continue;
            }
            self.keys[field.index()] = Some(key);
            format_key(field, key, &mut self.values[field.index()]);
            self.format_calls += 1;
            self.render_cell(field);
            changed = true;
        }
        self.dirty = changed;
        changed
    }

    fn render_cell(
        &mut self,
        field: Field,
    ) {
        self.render_calls += 1;

        let styles = *self.styles.field(field);
        let background = self.styles.background;
        let grid = self.styles.grid;
        let label_y = self.styles.label_y;
        let value_y = self.styles.value_y;
        let unit_gap = self.styles.unit_gap;
        let value = self.values[field.index()].clone();

        let rect = cell_rect(field);
        let mut raster = self.raster(field.bar());
        let mut cell = raster.clipped(&rect);
        cell.fill_solid(&rect, background).ok();

        let left = rect.top_left.x + grid;
        Text::with_baseline(field.label(), Point::new(left, label_y), styles.label, Baseline::Top)
            .draw(&mut cell)
            .ok();

        // Value and unit share the alphabetic baseline of the value font
        let baseline = value_y + styles.value.font.baseline as i32;
        let start = Point::new(left, baseline);
        let end = Text::with_baseline(&value, start, styles.value, Baseline::Alphabetic)
            .draw(&mut cell)
            .unwrap_or(start);

        let unit = field.unit();
        if !unit.is_empty() {
            Text::with_baseline(unit, Point::new(end.x + unit_gap, baseline), styles.unit, Baseline::Alphabetic)
                .draw(&mut cell)
                .ok();
        }
    }

    /// Copy both cached bars into a full frame buffer.
    pub fn patch_into(
        &self,
        frame: &mut [u8],
    ) {
        debug_assert_eq!(frame.len(), FRAME_BYTES);
        frame[..BAR_BYTES].copy_from_slice(&self.patches[Bar::Top.index()]);
        frame[BOTTOM_BAR_OFFSET..BOTTOM_BAR_OFFSET + BAR_BYTES].copy_from_slice(&self.patches[Bar::Bottom.index()]);
    }

    /// Whether the last [`update`](Self::update) changed anything.
    #[inline]
    pub const fn is_dirty(&self) -> bool { self.dirty }

    /// Currently displayed text for a field (empty before the first update).
    pub fn displayed(
        &self,
        field: Field,
    ) -> &str {
        self.values[field.index()].as_str()
    }

    /// Total value formatting operations since construction.
    #[inline]
    pub const fn format_calls(&self) -> u32 { self.format_calls }

    /// Total cell renders since construction.
    #[inline]
    pub const fn render_calls(&self) -> u32 { self.render_calls }

    /// Cached patch bytes for a bar.
    #[inline]
    pub const fn patch(
        &self,
        bar: Bar,
    ) -> &[u8; BAR_BYTES] {
        &self.patches[bar.index()]
    }
}
