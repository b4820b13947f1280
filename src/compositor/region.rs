//! Region algebra
//!
//! Pixel-area values used for damage, opaque and input regions. A region is
//! kept in a canonical y-x banded form (like pixman): rows of
//! non-overlapping boxes, bands with identical spans merged vertically. Two
//! regions covering the same area therefore compare equal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A rectangle in surface-local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle anchored at the origin with the given size
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// True if the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    fn to_box(self) -> Box64 {
        Box64 {
            x1: self.x as i64,
            y1: self.y as i64,
            x2: self.x as i64 + self.width as i64,
            y2: self.y as i64 + self.height as i64,
        }
    }
}

/// Width and height of a surface or buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Internal box with exclusive far edges. 64-bit so the infinite region
/// (`i32::MIN` origin, `u32::MAX` extent) can be represented exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Box64 {
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
}

impl Box64 {
    fn is_empty(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    fn to_rect(self) -> Rect {
        let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        Rect {
            x: clamp(self.x1),
            y: clamp(self.y1),
            width: clamp(self.x2 - self.x1),
            height: clamp(self.y2 - self.y1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Union,
    Intersect,
    Subtract,
}

impl Op {
    fn apply(self, a: bool, b: bool) -> bool {
        match self {
            Op::Union => a || b,
            Op::Intersect => a && b,
            Op::Subtract => a && !b,
        }
    }
}

/// An additive/intersective pixel area
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Region {
    boxes: Vec<Box64>,
}

impl Region {
    /// Create a new empty region
    pub fn new() -> Self {
        Self { boxes: Vec::new() }
    }

    /// Region covering a single rectangle
    pub fn from_rect(rect: Rect) -> Self {
        let b = rect.to_box();
        if b.is_empty() {
            return Self::new();
        }
        Self { boxes: vec![b] }
    }

    /// The unbounded plane, used as the default input region
    pub fn infinite() -> Self {
        let min = i32::MIN as i64;
        let extent = u32::MAX as i64;
        Self {
            boxes: vec![Box64 {
                x1: min,
                y1: min,
                x2: min + extent,
                y2: min + extent,
            }],
        }
    }

    /// Check if the region is empty
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Remove everything from the region
    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    /// Replace this region's contents with a copy of `other`
    pub fn copy_from(&mut self, other: &Region) {
        self.boxes.clone_from(&other.boxes);
    }

    /// Add a rectangle to the region
    pub fn union_rect(&mut self, rect: Rect) {
        self.union(&Region::from_rect(rect));
    }

    /// Subtract a rectangle from the region
    pub fn subtract_rect(&mut self, rect: Rect) {
        self.subtract(&Region::from_rect(rect));
    }

    /// Clip the region to a rectangle
    pub fn intersect_rect(&mut self, rect: Rect) {
        self.intersect(&Region::from_rect(rect));
    }

    pub fn union(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        self.boxes = combine(&self.boxes, &other.boxes, Op::Union);
    }

    pub fn intersect(&mut self, other: &Region) {
        self.boxes = combine(&self.boxes, &other.boxes, Op::Intersect);
    }

    pub fn subtract(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        self.boxes = combine(&self.boxes, &other.boxes, Op::Subtract);
    }

    /// Check if a point is inside the region
    pub fn contains(&self, px: i32, py: i32) -> bool {
        let (px, py) = (px as i64, py as i64);
        self.boxes
            .iter()
            .any(|b| px >= b.x1 && px < b.x2 && py >= b.y1 && py < b.y2)
    }

    /// Bounding rectangle of the region
    pub fn extents(&self) -> Rect {
        let mut iter = self.boxes.iter();
        let Some(first) = iter.next() else {
            return Rect::default();
        };
        iter.fold(*first, |acc, b| Box64 {
            x1: acc.x1.min(b.x1),
            y1: acc.y1.min(b.y1),
            x2: acc.x2.max(b.x2),
            y2: acc.y2.max(b.y2),
        })
        .to_rect()
    }

    /// Number of canonical rectangles
    pub fn num_rects(&self) -> usize {
        self.boxes.len()
    }

    /// The canonical rectangles making up the region
    pub fn rects(&self) -> Vec<Rect> {
        self.boxes.iter().map(|b| b.to_rect()).collect()
    }
}

/// Split canonical boxes into bands of equal `y1`/`y2`
fn bands(boxes: &[Box64]) -> Vec<&[Box64]> {
    boxes
        .chunk_by(|p, q| p.y1 == q.y1 && p.y2 == q.y2)
        .collect()
}

/// Combine the spans of two bands in one sweep over their sorted edges.
///
/// Both inputs are sorted and disjoint, so the parity of consumed edges
/// tells whether the sweep is inside a span.
fn merge_spans(a: &[Box64], b: &[Box64], op: Op) -> Vec<(i64, i64)> {
    let edge = |spans: &[Box64], k: usize| {
        let b = spans[k / 2];
        if k % 2 == 0 {
            b.x1
        } else {
            b.x2
        }
    };
    let (na, nb) = (a.len() * 2, b.len() * 2);
    let (mut ia, mut ib) = (0, 0);

    let mut out = Vec::new();
    let mut open: Option<i64> = None;
    while ia < na || ib < nb {
        let x = match (ia < na, ib < nb) {
            (true, true) => edge(a, ia).min(edge(b, ib)),
            (true, false) => edge(a, ia),
            _ => edge(b, ib),
        };
        while ia < na && edge(a, ia) == x {
            ia += 1;
        }
        while ib < nb && edge(b, ib) == x {
            ib += 1;
        }

        let inside = op.apply(ia % 2 == 1, ib % 2 == 1);
        match (inside, open) {
            (true, None) => open = Some(x),
            (false, Some(start)) => {
                out.push((start, x));
                open = None;
            }
            _ => {}
        }
    }
    out
}

/// Banded merge of two canonical regions, linear in their box counts
fn combine(a: &[Box64], b: &[Box64], op: Op) -> Vec<Box64> {
    let a_bands = bands(a);
    let b_bands = bands(b);
    let (mut ia, mut ib) = (0, 0);

    let mut out: Vec<Box64> = Vec::new();
    // Start index and bottom edge of the last emitted band
    let mut last_band: Option<(usize, i64)> = None;

    let Some(mut y) = [a_bands.first(), b_bands.first()]
        .into_iter()
        .flatten()
        .map(|band| band[0].y1)
        .min()
    else {
        return out;
    };

    while ia < a_bands.len() || ib < b_bands.len() {
        match op {
            Op::Intersect if ia == a_bands.len() || ib == b_bands.len() => break,
            Op::Subtract if ia == a_bands.len() => break,
            _ => {}
        }

        let a_band = a_bands.get(ia).copied();
        let b_band = b_bands.get(ib).copied();
        let a_active = a_band.filter(|band| band[0].y1 <= y);
        let b_active = b_band.filter(|band| band[0].y1 <= y);

        // Next horizontal edge: a band starting or an active band ending
        let bottom = [a_band, b_band]
            .into_iter()
            .flatten()
            .map(|band| if band[0].y1 > y { band[0].y1 } else { band[0].y2 })
            .min()
            .unwrap_or(y);

        if a_active.is_some() || b_active.is_some() {
            let spans = merge_spans(a_active.unwrap_or(&[]), b_active.unwrap_or(&[]), op);
            if !spans.is_empty() {
                push_band(&mut out, &mut last_band, &spans, y, bottom);
            }
        }

        if a_active.is_some_and(|band| band[0].y2 == bottom) {
            ia += 1;
        }
        if b_active.is_some_and(|band| band[0].y2 == bottom) {
            ib += 1;
        }
        y = bottom;
    }
    out
}

/// Append a band, growing the previous one instead when the spans match
fn push_band(
    out: &mut Vec<Box64>,
    last_band: &mut Option<(usize, i64)>,
    spans: &[(i64, i64)],
    top: i64,
    bottom: i64,
) {
    if let Some((start, prev_bottom)) = *last_band {
        let prev = &out[start..];
        let same = prev_bottom == top
            && prev.len() == spans.len()
            && prev.iter().zip(spans).all(|(p, s)| p.x1 == s.0 && p.x2 == s.1);
        if same {
            for b in &mut out[start..] {
                b.y2 = bottom;
            }
            *last_band = Some((start, bottom));
            return;
        }
    }

    let start = out.len();
    out.extend(spans.iter().map(|&(x1, x2)| Box64 {
        x1,
        y1: top,
        x2,
        y2: bottom,
    }));
    *last_band = Some((start, bottom));
}

/// Unique identifier for client regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub u64);

impl RegionId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        RegionId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Storage for client-created `wl_region` objects
#[derive(Debug, Default)]
pub struct RegionManager {
    regions: HashMap<RegionId, Region>,
}

impl RegionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty region and return its ID
    pub fn create_region(&mut self) -> RegionId {
        let id = RegionId::new();
        self.regions.insert(id, Region::new());
        id
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.regions.get_mut(&id)
    }

    pub fn remove(&mut self, id: RegionId) -> Option<Region> {
        self.regions.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
