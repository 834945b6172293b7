//! HUD text styles and the three-level override cascade.
//!
//! A [`HudTheme`] is what a settings file describes: optional color, size and
//! font overrides at the HUD, bar and field level. [`HudTheme::resolve`]
//! flattens it once into a [`ResolvedStyles`] table of ready-made
//! `MonoTextStyle`s so the render path only indexes an array.
//!
//! Priority for each text role (label, value, unit):
//!
//! ```text
//! field override  >  bar override  >  HUD base  >  built-in default
//! ```

use embedded_graphics::{
    mono_font::{
        MonoFont, MonoTextStyle,
        ascii::{FONT_6X10, FONT_7X13, FONT_9X15, FONT_10X20},
    },
    pixelcolor::Rgb565,
};
use profont::{
    PROFONT_7_POINT, PROFONT_9_POINT, PROFONT_10_POINT, PROFONT_12_POINT, PROFONT_14_POINT, PROFONT_18_POINT,
    PROFONT_24_POINT,
};

use crate::colors::{Rgb, rgb};

// =============================================================================
// Fields and Bars
// =============================================================================

/// Number of HUD fields.
pub const FIELD_COUNT: usize = 6;

/// Fields per bar.
pub const CELLS_PER_BAR: usize = 3;

/// One of the two HUD bars.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bar {
    Top,
    Bottom,
}

impl Bar {
    pub const ALL: [Self; 2] = [Self::Top, Self::Bottom];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Top => 0,
            Self::Bottom => 1,
        }
    }
}

/// A telemetry field shown in one HUD cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Lat,
    Lon,
    Over,
    Alt,
    Vel,
    Age,
}

impl Field {
    pub const ALL: [Self; FIELD_COUNT] = [Self::Lat, Self::Lon, Self::Over, Self::Alt, Self::Vel, Self::Age];

    #[inline]
    pub const fn index(self) -> usize { self as usize }

    #[inline]
    pub const fn bar(self) -> Bar {
        match self {
            Self::Lat | Self::Lon | Self::Over => Bar::Top,
            Self::Alt | Self::Vel | Self::Age => Bar::Bottom,
        }
    }

    /// Position of the cell within its bar, left to right.
    #[inline]
    pub const fn slot(self) -> usize { self.index() % CELLS_PER_BAR }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Lat => "LAT",
            Self::Lon => "LON",
            Self::Over => "OVER",
            Self::Alt => "ALT",
            Self::Vel => "VEL",
            Self::Age => "AGE",
        }
    }

    /// Unit suffix drawn after the value, empty when none.
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Alt => "km",
            Self::Vel => "km/h",
            _ => "",
        }
    }
}

// =============================================================================
// Theme (unresolved)
// =============================================================================

/// Bitmap font family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FontFamily {
    #[default]
    ProFont,
    /// The embedded-graphics ASCII fonts.
    Classic,
}

/// Partial text style; `None` inherits from the next level down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TextOverride {
    pub color: Option<Rgb>,
    pub size: Option<u8>,
    pub font: Option<FontFamily>,
}

impl TextOverride {
    pub const NONE: Self = Self { color: None, size: None, font: None };

    pub const fn new(
        color: Rgb,
        size: u8,
    ) -> Self {
        Self { color: Some(color), size: Some(size), font: None }
    }

    /// Fill unset values from `lower`.
    #[inline]
    pub const fn or(
        self,
        lower: Self,
    ) -> Self {
        Self {
            color: if self.color.is_some() { self.color } else { lower.color },
            size: if self.size.is_some() { self.size } else { lower.size },
            font: if self.font.is_some() { self.font } else { lower.font },
        }
    }
}

/// Label/value/unit overrides for one scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RoleOverrides {
    pub label: TextOverride,
    pub value: TextOverride,
    pub unit: TextOverride,
}

impl RoleOverrides {
    #[inline]
    const fn get(
        &self,
        role: Role,
    ) -> TextOverride {
        match role {
            Role::Label => self.label,
            Role::Value => self.value,
            Role::Unit => self.unit,
        }
    }
}

/// Bar-level overrides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BarTheme {
    pub border_color: Option<Rgb>,
    pub label: TextOverride,
    pub value: TextOverride,
    pub unit: TextOverride,
}

impl BarTheme {
    #[inline]
    const fn roles(&self) -> RoleOverrides { RoleOverrides { label: self.label, value: self.value, unit: self.unit } }
}

/// Per-field overrides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FieldThemes {
    pub lat: RoleOverrides,
    pub lon: RoleOverrides,
    pub over: RoleOverrides,
    pub alt: RoleOverrides,
    pub vel: RoleOverrides,
    pub age: RoleOverrides,
}

impl FieldThemes {
    const fn get(
        &self,
        field: Field,
    ) -> &RoleOverrides {
        match field {
            Field::Lat => &self.lat,
            Field::Lon => &self.lon,
            Field::Over => &self.over,
            Field::Alt => &self.alt,
            Field::Vel => &self.vel,
            Field::Age => &self.age,
        }
    }
}

/// Complete HUD theme as configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HudTheme {
    /// Horizontal padding inside a cell (px).
    pub grid: u8,
    pub label_y: u8,
    pub value_y: u8,
    pub unit_gap: u8,
    pub background: Rgb,
    pub border_color: Rgb,
    pub label: TextOverride,
    pub value: TextOverride,
    pub unit: TextOverride,
    pub top: BarTheme,
    pub bottom: BarTheme,
    pub fields: FieldThemes,
}

impl Default for HudTheme {
    fn default() -> Self {
        Self {
            grid: 8,
            label_y: 6,
            value_y: 22,
            unit_gap: 2,
            background: [0, 0, 0],
            border_color: [255, 255, 255],
            label: TextOverride::new([9, 222, 27], 11),
            value: TextOverride::new([255, 255, 255], 17),
            unit: TextOverride::new([255, 255, 255], 15),
            top: BarTheme::default(),
            bottom: BarTheme::default(),
            fields: FieldThemes::default(),
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Text role within a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Label,
    Value,
    Unit,
}

/// Built-in fallback when every level leaves a value unset.
const fn builtin(role: Role) -> TextOverride {
    match role {
        Role::Label => TextOverride { color: Some([9, 222, 27]), size: Some(11), font: Some(FontFamily::ProFont) },
        Role::Value => TextOverride { color: Some([255, 255, 255]), size: Some(17), font: Some(FontFamily::ProFont) },
        Role::Unit => TextOverride { color: Some([255, 255, 255]), size: Some(15), font: Some(FontFamily::ProFont) },
    }
}

/// Fully resolved text styles for one field.
#[derive(Clone, Copy, Debug)]
pub struct FieldStyle {
    pub label: MonoTextStyle<'static, Rgb565>,
    pub value: MonoTextStyle<'static, Rgb565>,
    pub unit: MonoTextStyle<'static, Rgb565>,
}

/// Flattened style table consumed by the HUD compositor.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedStyles {
    pub fields: [FieldStyle; FIELD_COUNT],
    pub borders: [Rgb565; 2],
    pub background: Rgb565,
    pub grid: i32,
    pub label_y: i32,
    pub value_y: i32,
    pub unit_gap: i32,
}

impl ResolvedStyles {
    #[inline]
    pub const fn field(
        &self,
        field: Field,
    ) -> &FieldStyle {
        &self.fields[field.index()]
    }

    #[inline]
    pub const fn border(
        &self,
        bar: Bar,
    ) -> Rgb565 {
        self.borders[bar.index()]
    }
}

impl HudTheme {
    #[inline]
    const fn roles(&self) -> RoleOverrides { RoleOverrides { label: self.label, value: self.value, unit: self.unit } }

    const fn bar(
        &self,
        bar: Bar,
    ) -> &BarTheme {
        match bar {
            Bar::Top => &self.top,
            Bar::Bottom => &self.bottom,
        }
    }

    /// Cascade one role for one field down to a complete override.
    pub const fn resolve_text(
        &self,
        field: Field,
        role: Role,
    ) -> TextOverride {
        self.fields
            .get(field)
            .get(role)
            .or(self.bar(field.bar()).roles().get(role))
            .or(self.roles().get(role))
            .or(builtin(role))
    }

    /// Flatten the whole theme into a lookup table.
    pub fn resolve(&self) -> ResolvedStyles {
        let style = |field: Field, role: Role| {
            // Every level is filled by the builtin fallback
            let text = self.resolve_text(field, role);
            MonoTextStyle::new(
                font_for(text.font.unwrap_or_default(), text.size.unwrap_or(11)),
                rgb(text.color.unwrap_or([255, 255, 255])),
            )
        };

        let fields = Field::ALL.map(|field| FieldStyle {
            label: style(field, Role::Label),
            value: style(field, Role::Value),
            unit: style(field, Role::Unit),
        });
        let borders = Bar::ALL.map(|bar| rgb(self.bar(bar).border_color.unwrap_or(self.border_color)));

        ResolvedStyles {
            fields,
            borders,
            background: rgb(self.background),
            grid: i32::from(self.grid),
            label_y: i32::from(self.label_y),
            value_y: i32::from(self.value_y),
            unit_gap: i32::from(self.unit_gap),
        }
    }
}

// =============================================================================
// Fonts
// =============================================================================

const PROFONTS: [(u8, &MonoFont<'static>); 7] = [
    (7, &PROFONT_7_POINT),
    (9, &PROFONT_9_POINT),
    (10, &PROFONT_10_POINT),
    (12, &PROFONT_12_POINT),
    (14, &PROFONT_14_POINT),
    (18, &PROFONT_18_POINT),
    (24, &PROFONT_24_POINT),
];

const CLASSIC: [(u8, &MonoFont<'static>); 4] =
    [(10, &FONT_6X10), (13, &FONT_7X13), (15, &FONT_9X15), (20, &FONT_10X20)];

/// Closest available bitmap font for a requested size; ties go to the smaller font.
pub fn font_for(
    family: FontFamily,
    size: u8,
) -> &'static MonoFont<'static> {
    let table: &[(u8, &'static MonoFont<'static>)] = match family {
        FontFamily::ProFont => &PROFONTS,
        FontFamily::Classic => &CLASSIC,
    };
    let mut best = table[0];
    for &entry in table {
        if entry.0.abs_diff(size) < best.0.abs_diff(size) {
            best = entry;
        }
    }
    best.1
}
