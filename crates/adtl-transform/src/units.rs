//! Unit conversion between commonly recorded clinical units.
//!
//! Every unit maps to a base unit of its dimension through
//! `base = value * factor + offset`; the offset is only non-zero for
//! temperatures.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Time,
    Mass,
    Length,
    Volume,
    Pressure,
    Temperature,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    pub dimension: Dimension,
    factor: f64,
    offset: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    #[error("undefined unit: {0}")]
    Undefined(String),
    #[error("cannot convert from {from} to {to}")]
    Incompatible { from: String, to: String },
}

const DAY: f64 = 86_400.0;
const YEAR: f64 = 365.25 * DAY;

impl Unit {
    const fn scaled(dimension: Dimension, factor: f64) -> Self {
        Self {
            dimension,
            factor,
            offset: 0.0,
        }
    }

    /// Look a unit up by symbol or name. Case-insensitive, surrounding spaces ignored.
    pub fn parse(name: &str) -> Option<Self> {
        use Dimension::{Length, Mass, Pressure, Temperature, Time, Volume};
        let unit = match name.trim().to_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Self::scaled(Time, 1.0),
            "min" | "minute" | "minutes" => Self::scaled(Time, 60.0),
            "h" | "hr" | "hour" | "hours" => Self::scaled(Time, 3_600.0),
            "d" | "day" | "days" => Self::scaled(Time, DAY),
            "wk" | "week" | "weeks" => Self::scaled(Time, 7.0 * DAY),
            "month" | "months" => Self::scaled(Time, YEAR / 12.0),
            "yr" | "year" | "years" => Self::scaled(Time, YEAR),
            "mg" | "milligram" | "milligrams" => Self::scaled(Mass, 1e-3),
            "g" | "gram" | "grams" => Self::scaled(Mass, 1.0),
            "kg" | "kilogram" | "kilograms" => Self::scaled(Mass, 1e3),
            "lb" | "lbs" | "pound" | "pounds" => Self::scaled(Mass, 453.592_37),
            "oz" | "ounce" | "ounces" => Self::scaled(Mass, 28.349_523_125),
            "mm" | "millimeter" | "millimetre" => Self::scaled(Length, 1e-3),
            "cm" | "centimeter" | "centimetre" => Self::scaled(Length, 1e-2),
            "m" | "meter" | "metre" | "meters" | "metres" => Self::scaled(Length, 1.0),
            "km" | "kilometer" | "kilometre" => Self::scaled(Length, 1e3),
            "in" | "inch" | "inches" => Self::scaled(Length, 0.0254),
            "ft" | "foot" | "feet" => Self::scaled(Length, 0.3048),
            "ml" | "milliliter" | "millilitre" => Self::scaled(Volume, 1e-3),
            "dl" | "deciliter" | "decilitre" => Self::scaled(Volume, 1e-1),
            "l" | "liter" | "litre" | "liters" | "litres" => Self::scaled(Volume, 1.0),
            "pa" | "pascal" => Self::scaled(Pressure, 1.0),
            "kpa" | "kilopascal" => Self::scaled(Pressure, 1e3),
            "mmhg" => Self::scaled(Pressure, 133.322_387_415),
            "k" | "kelvin" => Self::scaled(Temperature, 1.0),
            "°c" | "degc" | "celsius" | "degree_celsius" => Self {
                dimension: Temperature,
                factor: 1.0,
                offset: 273.15,
            },
            "°f" | "degf" | "fahrenheit" | "degree_fahrenheit" => Self {
                dimension: Temperature,
                factor: 5.0 / 9.0,
                offset: 459.67 * 5.0 / 9.0,
            },
            _ => return None,
        };
        Some(unit)
    }
}

/// Convert `value` from unit `from` to unit `to`.
pub fn convert(value: f64, from: &str, to: &str) -> Result<f64, UnitError> {
    let source = Unit::parse(from).ok_or_else(|| UnitError::Undefined(from.to_string()))?;
    let target = Unit::parse(to).ok_or_else(|| UnitError::Undefined(to.to_string()))?;
    if source.dimension != target.dimension {
        return Err(UnitError::Incompatible {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    let base = value * source.factor + source.offset;
    Ok((base - target.offset) / target.factor)
}
