//! Color schemes, the multi-stop interpolation engine and discrete class
//! palettes.

use emberline_algorithms::imagery::{SeverityClass, NO_DATA_CLASS};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn with_alpha(self, a: u8) -> [u8; 4] {
        [self.r, self.g, self.b, a]
    }
}

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

/// Continuous color schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    /// Green -> Pale yellow -> Red (burn severity change)
    #[default]
    Dnbr,
    /// Red -> Yellow -> Green (vegetation health, NBR)
    Nbr,
    /// Black -> White
    Grayscale,
}

impl ColorScheme {
    pub const ALL: &'static [ColorScheme] = &[Self::Dnbr, Self::Nbr, Self::Grayscale];

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dnbr => "dNBR",
            Self::Nbr => "NBR",
            Self::Grayscale => "Grayscale",
        }
    }

    /// Value range the scheme is designed for.
    pub fn default_range(&self) -> (f64, f64) {
        match self {
            Self::Dnbr | Self::Nbr => (-1.0, 1.0),
            Self::Grayscale => (0.0, 1.0),
        }
    }
}

impl FromStr for ColorScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dnbr" => Ok(Self::Dnbr),
            "nbr" => Ok(Self::Nbr),
            "grayscale" | "gray" | "grey" => Ok(Self::Grayscale),
            other => Err(format!("unknown color scheme '{}'", other)),
        }
    }
}

// ─── Color stop definitions ────────────────────────────────────────────

const DNBR_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 26, 152, 80),
    ColorStop::new(0.20, 102, 189, 99),
    ColorStop::new(0.35, 255, 255, 190),
    ColorStop::new(0.55, 253, 174, 97),
    ColorStop::new(0.80, 244, 109, 67),
    ColorStop::new(1.00, 215, 48, 39),
];

const NBR_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 165, 0, 38),
    ColorStop::new(0.25, 244, 109, 67),
    ColorStop::new(0.50, 255, 255, 191),
    ColorStop::new(0.75, 102, 189, 99),
    ColorStop::new(1.00, 0, 104, 55),
];

// ─── Interpolation engine ──────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    let last = stops[stops.len() - 1];
    if t <= stops[0].t {
        return stops[0].color;
    }
    if t >= last.t {
        return last.color;
    }
    for pair in stops.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if t <= hi.t {
            let ratio = (t - lo.t) / (hi.t - lo.t);
            return lerp_color(lo.color, hi.color, ratio);
        }
    }
    last.color
}

/// Evaluate a color scheme at normalized position `t` ∈ [0, 1].
/// Positions outside the interval clamp to the end colors.
pub fn evaluate(scheme: ColorScheme, t: f64) -> Rgb {
    match scheme {
        ColorScheme::Dnbr => multi_stop(DNBR_STOPS, t),
        ColorScheme::Nbr => multi_stop(NBR_STOPS, t),
        ColorScheme::Grayscale => {
            let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb::new(v, v, v)
        }
    }
}

// ─── Discrete palettes ─────────────────────────────────────────────────

/// Fixed code → color mapping for classified rasters.
///
/// Codes without an entry (and the no-data code) render fully transparent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPalette {
    entries: Vec<PaletteEntry>,
    nodata_code: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub code: u8,
    pub label: String,
    pub color: Rgb,
}

impl ClassPalette {
    pub fn new(entries: Vec<PaletteEntry>, nodata_code: u8) -> Self {
        Self {
            entries,
            nodata_code,
        }
    }

    /// USGS burn-severity colors, one per [`SeverityClass`].
    pub fn burn_severity() -> Self {
        let entries = SeverityClass::ALL
            .iter()
            .map(|&class| PaletteEntry {
                code: class.code(),
                label: class.label().to_string(),
                color: severity_color(class),
            })
            .collect();
        Self::new(entries, NO_DATA_CLASS)
    }

    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    pub fn nodata_code(&self) -> u8 {
        self.nodata_code
    }

    /// Color for `code`, or `None` for no-data and unmapped codes.
    pub fn color(&self, code: u8) -> Option<Rgb> {
        if code == self.nodata_code {
            return None;
        }
        self.entries.iter().find(|e| e.code == code).map(|e| e.color)
    }
}

fn severity_color(class: SeverityClass) -> Rgb {
    match class {
        SeverityClass::EnhancedRegrowth => Rgb::new(26, 152, 80),
        SeverityClass::Unburned => Rgb::new(166, 217, 106),
        SeverityClass::Low => Rgb::new(255, 255, 190),
        SeverityClass::ModerateLow => Rgb::new(253, 174, 97),
        SeverityClass::ModerateHigh => Rgb::new(244, 109, 67),
        SeverityClass::High => Rgb::new(215, 48, 39),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dnbr_endpoints() {
        assert_eq!(evaluate(ColorScheme::Dnbr, 0.0), Rgb::new(26, 152, 80));
        assert_eq!(evaluate(ColorScheme::Dnbr, 1.0), Rgb::new(215, 48, 39));
    }

    #[test]
    fn dnbr_interpolates_between_stops() {
        // 40% of the way from 0.20 to 0.35
        let c = evaluate(ColorScheme::Dnbr, 0.26);
        assert_eq!(c, Rgb::new(163, 215, 135));
    }

    #[test]
    fn grayscale_midpoint() {
        assert_eq!(evaluate(ColorScheme::Grayscale, 0.5), Rgb::new(128, 128, 128));
    }

    #[test]
    fn clamping_outside_unit_interval() {
        assert_eq!(evaluate(ColorScheme::Nbr, -0.5), Rgb::new(165, 0, 38));
        assert_eq!(evaluate(ColorScheme::Nbr, 1.5), Rgb::new(0, 104, 55));
    }

    #[test]
    fn scheme_parsing() {
        assert_eq!("dNBR".parse::<ColorScheme>().unwrap(), ColorScheme::Dnbr);
        assert_eq!("grey".parse::<ColorScheme>().unwrap(), ColorScheme::Grayscale);
        assert!("terrain".parse::<ColorScheme>().is_err());
    }

    #[test]
    fn severity_palette_covers_six_classes() {
        let p = ClassPalette::burn_severity();
        assert_eq!(p.entries().len(), 6);
        assert_eq!(p.color(SeverityClass::High.code()), Some(Rgb::new(215, 48, 39)));
        assert_eq!(p.color(NO_DATA_CLASS), None);
        assert_eq!(p.color(42), None);
        assert_eq!(p.entries()[0].label, SeverityClass::EnhancedRegrowth.label());
    }
}
