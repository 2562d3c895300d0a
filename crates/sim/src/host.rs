//! Host page contract.
//!
//! The simulation never talks to a real document. It sees the page through
//! [`Layout`]: surface bounds, selector queries and the scroll offset.
//! [`StaticPage`] is a JSON-described page used by the desktop runner and
//! the tests, and [`SurfaceRegistry`] brings every eligible surface up once.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned box in viewport pixels (y down).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn offset_y(&self, dy: f32) -> Self {
        Self {
            top: self.top + dy,
            ..*self
        }
    }
}

/// Malformed selector list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector in `{0}`")]
    Empty(String),
    #[error("combinators are not supported in `{0}`")]
    Combinator(String),
    #[error("unexpected `{found}` in `{selector}`")]
    Unexpected { selector: String, found: char },
}

/// What the simulation needs to know about the host page.
pub trait Layout {
    /// Viewport bounds of a render surface.
    fn surface_rect(&self, id: &str) -> Option<Rect>;

    /// Viewport bounds of every element matching a comma separated
    /// selector list, in document order.
    fn query_selector_all(&self, selectors: &str) -> Result<Vec<Rect>, SelectorError>;

    /// Vertical page scroll in pixels.
    fn scroll_offset(&self) -> f32;
}

// ============================================================================
// SELECTORS
// ============================================================================

/// One compound selector: `tag.class#id` with every part optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl Compound {
    pub fn matches(&self, element: &Element) -> bool {
        self.tag
            .as_ref()
            .map_or(true, |t| t.eq_ignore_ascii_case(&element.tag))
            && self
                .id
                .as_ref()
                .map_or(true, |id| element.id.as_deref() == Some(id.as_str()))
            && self
                .classes
                .iter()
                .all(|c| element.classes.iter().any(|ec| ec == c))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(text: &str) -> Result<Compound, SelectorError> {
    if text.is_empty() {
        return Err(SelectorError::Empty(text.to_string()));
    }
    if text.contains(char::is_whitespace) || text.contains(['>', '+', '~']) {
        return Err(SelectorError::Combinator(text.to_string()));
    }

    let mut compound = Compound::default();
    let mut chars = text.chars().peekable();
    let mut universal = false;

    while let Some(&c) = chars.peek() {
        let sigil = match c {
            '.' | '#' => {
                chars.next();
                Some(c)
            }
            '*' if compound == Compound::default() && !universal => {
                chars.next();
                universal = true;
                continue;
            }
            c if is_ident_char(c) && compound == Compound::default() && !universal => None,
            other => {
                return Err(SelectorError::Unexpected {
                    selector: text.to_string(),
                    found: other,
                })
            }
        };

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            return Err(SelectorError::Empty(text.to_string()));
        }

        match sigil {
            None => compound.tag = Some(name),
            Some('.') => compound.classes.push(name),
            _ => compound.id = Some(name),
        }
    }
    Ok(compound)
}

/// Parse a comma separated selector list.
pub fn parse_selectors(selectors: &str) -> Result<Vec<Compound>, SelectorError> {
    selectors
        .split(',')
        .map(|part| parse_compound(part.trim()))
        .collect()
}

// ============================================================================
// STATIC PAGE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// A render surface as declared in markup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurfaceSpec {
    pub id: String,
    /// Document-space bounds
    pub rect: Rect,
    /// Pinned to the viewport instead of scrolling with the document
    pub fixed: bool,
    pub fluid_enabled: bool,
    /// Serialized settings, as stored in markup
    pub settings: String,
    /// Serialized initial-shape list, as stored in markup
    pub shapes: String,
    /// Hex color of the content behind the surface; blend modes composite
    /// over it. Empty means black.
    pub background: String,
}

/// A page element that selectors can match.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Document-space bounds
    pub rect: Rect,
    pub fixed: bool,
}

/// Error loading a page description.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("failed to read page description: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed page description: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON-described page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticPage {
    pub viewport: Viewport,
    pub scroll: f32,
    pub surfaces: Vec<SurfaceSpec>,
    pub elements: Vec<Element>,
}

impl StaticPage {
    pub fn from_json(json: &str) -> Result<Self, PageError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, PageError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn surface(&self, id: &str) -> Option<&SurfaceSpec> {
        self.surfaces.iter().find(|s| s.id == id)
    }

    /// Scroll the document, clamped at the top.
    pub fn set_scroll(&mut self, offset: f32) {
        self.scroll = offset.max(0.0);
    }

    fn to_viewport(&self, rect: Rect, fixed: bool) -> Rect {
        if fixed {
            rect
        } else {
            rect.offset_y(-self.scroll)
        }
    }
}

impl Layout for StaticPage {
    fn surface_rect(&self, id: &str) -> Option<Rect> {
        self.surface(id).map(|s| self.to_viewport(s.rect, s.fixed))
    }

    fn query_selector_all(&self, selectors: &str) -> Result<Vec<Rect>, SelectorError> {
        let compounds = parse_selectors(selectors)?;
        Ok(self
            .elements
            .iter()
            .filter(|e| compounds.iter().any(|c| c.matches(e)))
            .map(|e| self.to_viewport(e.rect, e.fixed))
            .collect())
    }

    fn scroll_offset(&self) -> f32 {
        self.scroll
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Every initialized surface of a page, keyed by id.
pub struct SurfaceRegistry<T> {
    instances: Vec<(String, T)>,
    /// Surfaces whose initialization failed; never retried
    disabled: HashSet<String>,
}

impl<T> Default for SurfaceRegistry<T> {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            disabled: HashSet::new(),
        }
    }
}

impl<T> SurfaceRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize every eligible surface not seen before. Safe to call
    /// repeatedly; a failing factory only disables its own surface.
    ///
    /// Returns the number of surfaces initialized by this call.
    pub fn initialize_all<F, E>(&mut self, page: &StaticPage, mut factory: F) -> usize
    where
        F: FnMut(&SurfaceSpec) -> Result<T, E>,
        E: fmt::Display,
    {
        let mut created = 0;
        for spec in page.surfaces.iter().filter(|s| s.fluid_enabled) {
            if self.contains(&spec.id) || self.disabled.contains(&spec.id) {
                continue;
            }
            match factory(spec) {
                Ok(instance) => {
                    log::info!("Initialized fluid surface `{}`", spec.id);
                    self.instances.push((spec.id.clone(), instance));
                    created += 1;
                }
                Err(e) => {
                    log::error!("Fluid surface `{}` disabled: {}", spec.id, e);
                    self.disabled.insert(spec.id.clone());
                }
            }
        }
        created
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.iter().any(|(k, _)| k == id)
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.contains(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.instances.iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.instances
            .iter_mut()
            .find(|(k, _)| k == id)
            .map(|(_, v)| v)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.instances.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Drop one instance. Returns it so the caller can tear it down.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let pos = self.instances.iter().position(|(k, _)| k == id)?;
        Some(self.instances.remove(pos).1)
    }
}
