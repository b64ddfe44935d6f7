//! CSS lengths and ordered style maps

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{NodeId, Surface, WindowSize};
use crate::{Error, Result};

/// A CSS length the engine knows how to resolve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Length {
    Px(f64),
    /// Percent of the viewport height
    Vh(f64),
    /// Percent of the viewport width
    Vw(f64),
    /// Percent of a reference length supplied at resolution time
    Percent(f64),
}

impl Length {
    /// Resolve to pixels. `reference` is what a percentage is relative to.
    pub fn resolve(&self, window: WindowSize, reference: f64) -> f64 {
        match *self {
            Length::Px(v) => v,
            Length::Vh(v) => window.height * v / 100.0,
            Length::Vw(v) => window.width * v / 100.0,
            Length::Percent(v) => reference * v / 100.0,
        }
    }

    pub fn px(value: f64) -> Self {
        Length::Px(value)
    }
}

impl FromStr for Length {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidLength(s.to_string());

        type Unit = fn(f64) -> Length;
        let (number, unit) = if let Some(n) = s.strip_suffix("px") {
            (n, Length::Px as Unit)
        } else if let Some(n) = s.strip_suffix("vh") {
            (n, Length::Vh as Unit)
        } else if let Some(n) = s.strip_suffix("vw") {
            (n, Length::Vw as Unit)
        } else if let Some(n) = s.strip_suffix('%') {
            (n, Length::Percent as Unit)
        } else {
            // Unitless is only meaningful for zero
            let value: f64 = s.parse().map_err(|_| invalid())?;
            return if value == 0.0 { Ok(Length::Px(0.0)) } else { Err(invalid()) };
        };

        let value: f64 = number.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }
        Ok(unit(value))
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Length::Px(v) => write!(f, "{v}px"),
            Length::Vh(v) => write!(f, "{v}vh"),
            Length::Vw(v) => write!(f, "{v}vw"),
            Length::Percent(v) => write!(f, "{v}%"),
        }
    }
}

impl TryFrom<String> for Length {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Length> for String {
    fn from(value: Length) -> Self {
        value.to_string()
    }
}

/// Ordered CSS property map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleMap(IndexMap<String, String>);

impl StyleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prop: &str, value: impl Into<String>) -> Self {
        self.set(prop, value);
        self
    }

    pub fn set(&mut self, prop: &str, value: impl Into<String>) {
        self.0.insert(prop.to_string(), value.into());
    }

    pub fn get(&self, prop: &str) -> Option<&str> {
        self.0.get(prop).map(String::as_str)
    }

    pub fn remove(&mut self, prop: &str) -> Option<String> {
        self.0.shift_remove(prop)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `overrides` laid over `self`; default properties keep their position
    pub fn merged(&self, overrides: &StyleMap) -> StyleMap {
        let mut out = self.clone();
        for (prop, value) in overrides.iter() {
            out.set(prop, value);
        }
        out
    }

    /// Serialise as a CSS declaration block body, e.g. `width: 100vw;z-index: 5;`
    pub fn to_css(&self) -> String {
        self.iter().map(|(p, v)| format!("{p}: {v};")).collect()
    }

    /// Write every property onto `node`
    pub fn apply<S: Surface + ?Sized>(&self, surface: &S, node: NodeId) {
        for (prop, value) in self.iter() {
            surface.set_style(node, prop, value);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StyleMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: WindowSize = WindowSize {
        width: 1000.0,
        height: 800.0,
    };

    #[test]
    fn test_parse_units() {
        assert_eq!("40vh".parse::<Length>().unwrap(), Length::Vh(40.0));
        assert_eq!("120px".parse::<Length>().unwrap(), Length::Px(120.0));
        assert_eq!(" 100vw ".parse::<Length>().unwrap(), Length::Vw(100.0));
        assert_eq!("50%".parse::<Length>().unwrap(), Length::Percent(50.0));
        assert_eq!("0".parse::<Length>().unwrap(), Length::Px(0.0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("tall".parse::<Length>().is_err());
        assert!("12".parse::<Length>().is_err());
        assert!("vh".parse::<Length>().is_err());
    }

    #[test]
    fn test_resolve() {
        assert_eq!(Length::Vh(40.0).resolve(WINDOW, 0.0), 320.0);
        assert_eq!(Length::Vw(10.0).resolve(WINDOW, 0.0), 100.0);
        assert_eq!(Length::Percent(50.0).resolve(WINDOW, 300.0), 150.0);
        assert_eq!(Length::Px(7.0).resolve(WINDOW, 0.0), 7.0);
    }

    #[test]
    fn test_merge_keeps_default_order_and_overrides_values() {
        let defaults = StyleMap::new().with("width", "100vw").with("z-index", "5");
        let overrides = StyleMap::new().with("z-index", "9").with("color", "red");
        let merged = defaults.merged(&overrides);
        assert_eq!(merged.to_css(), "width: 100vw;z-index: 9;color: red;");
    }
}
