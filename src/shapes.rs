use glam::{Mat2, Vec2, Vec4};

use crate::grid::Grid;

/// Cells further than this from a shape's bounding box are left untouched
/// when its distance field is rasterized.
pub const DEFAULT_EXTENT: f32 = 10.0;

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    /// Spans `[0, size]` in local space, so the anchor is a corner.
    Rectangle { size: Vec2 },
    /// Counter-clockwise or clockwise, the sign test does not care.
    Polygon { points: Vec<Vec2> },
}

impl Shape {
    fn signed_distance(&self, p: Vec2) -> f32 {
        match self {
            Shape::Circle { radius } => p.length() - radius,
            Shape::Rectangle { size } => {
                let half = *size * 0.5;
                let q = (p - half).abs() - half;
                q.max(Vec2::ZERO).length() + q.x.max(q.y).min(0.0)
            }
            Shape::Polygon { points } => polygon_distance(points, p),
        }
    }
    fn local_bounds(&self) -> (Vec2, Vec2) {
        match self {
            Shape::Circle { radius } => (Vec2::splat(-radius), Vec2::splat(*radius)),
            Shape::Rectangle { size } => (Vec2::ZERO, *size),
            Shape::Polygon { points } => points.iter().fold(
                (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
                |(lo, hi), p| (lo.min(*p), hi.max(*p)),
            ),
        }
    }
}

fn polygon_distance(v: &[Vec2], p: Vec2) -> f32 {
    if v.is_empty() {
        return f32::INFINITY;
    }
    let n = v.len();
    let mut d = (p - v[0]).length_squared();
    let mut s = 1.0;
    for i in 0..n {
        let j = (i + n - 1) % n;
        let e = v[j] - v[i];
        let w = p - v[i];
        let t = if e.length_squared() > 0.0 {
            (w.dot(e) / e.dot(e)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let b = w - e * t;
        d = d.min(b.length_squared());
        let c = [p.y >= v[i].y, p.y < v[j].y, e.x * w.y > e.y * w.x];
        if c.iter().all(|x| *x) || c.iter().all(|x| !*x) {
            s = -s;
        }
    }
    s * d.sqrt()
}

/// A shape placed in grid space. The local point `anchor` lands on
/// `position`, and the shape is rotated by `rotation` radians around it.
#[derive(Clone, Debug, PartialEq)]
pub struct Drawable {
    pub shape: Shape,
    pub position: Vec2,
    pub rotation: f32,
    pub anchor: Vec2,
    /// Swaps inside and outside, e.g. for the walls of a box.
    pub inverse: bool,
    pub extent: f32,
    pub colour: Vec4,
}

impl Drawable {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            position: Vec2::ZERO,
            rotation: 0.0,
            anchor: Vec2::ZERO,
            inverse: false,
            extent: DEFAULT_EXTENT,
            colour: Vec4::new(1.0, 0.0, 0.0, 0.0),
        }
    }
    pub fn circle(radius: f32) -> Self {
        Self::new(Shape::Circle { radius })
    }
    pub fn rectangle(size: Vec2) -> Self {
        Self::new(Shape::Rectangle { size })
    }
    pub fn polygon(points: Vec<Vec2>) -> Self {
        Self::new(Shape::Polygon { points })
    }
    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }
    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }
    pub fn with_anchor(mut self, anchor: Vec2) -> Self {
        self.anchor = anchor;
        self
    }
    pub fn with_colour(mut self, colour: Vec4) -> Self {
        self.colour = colour;
        self
    }
    pub fn with_extent(mut self, extent: f32) -> Self {
        self.extent = extent;
        self
    }
    pub fn inverted(mut self) -> Self {
        self.inverse = !self.inverse;
        self
    }

    fn to_local(&self, p: Vec2) -> Vec2 {
        Mat2::from_angle(-self.rotation) * (p - self.position) + self.anchor
    }
    pub fn signed_distance(&self, p: Vec2) -> f32 {
        let d = self.shape.signed_distance(self.to_local(p));
        if self.inverse {
            -d
        } else {
            d
        }
    }
    pub fn covers(&self, p: Vec2) -> bool {
        self.signed_distance(p) < 0.0
    }
    /// Grid-space box this drawable can affect, `None` when it reaches
    /// everywhere (inverted shapes).
    pub fn bounds(&self) -> Option<(Vec2, Vec2)> {
        if self.inverse {
            return None;
        }
        let (lo, hi) = self.shape.local_bounds();
        let rot = Mat2::from_angle(self.rotation);
        let corners = [lo, Vec2::new(hi.x, lo.y), Vec2::new(lo.x, hi.y), hi];
        let (mut min, mut max) = (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY));
        for c in corners {
            let p = rot * (c - self.anchor) + self.position;
            min = min.min(p);
            max = max.max(p);
        }
        Some((min, max))
    }
    fn reaches(&self, bounds: &Option<(Vec2, Vec2)>, p: Vec2, margin: f32) -> bool {
        match bounds {
            None => true,
            Some((lo, hi)) => {
                p.cmpge(*lo - margin).all() && p.cmple(*hi + margin).all()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Blend {
    /// min
    Union,
    /// max
    Intersection,
    Replace,
    Add,
}

impl Blend {
    pub fn apply(self, dst: f32, src: f32) -> f32 {
        match self {
            Blend::Union => dst.min(src),
            Blend::Intersection => dst.max(src),
            Blend::Replace => src,
            Blend::Add => dst + src,
        }
    }
}

/// A recorded draw. Nothing happens until it is submitted to a target.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderCommand {
    pub drawables: Vec<Drawable>,
    pub blend: Blend,
}

pub trait RenderTarget {
    fn render(&mut self, command: &RenderCommand);
}

impl RenderCommand {
    pub fn new(drawables: Vec<Drawable>, blend: Blend) -> Self {
        Self { drawables, blend }
    }
    pub fn submit<T: RenderTarget + ?Sized>(&self, target: &mut T) {
        target.render(self);
    }

    /// Blends each drawable's signed distance into the samples within its
    /// extent.
    pub fn render_distance(&self, grid: &mut Grid<f32>) {
        let bounds: Vec<_> = self.drawables.iter().map(|d| d.bounds()).collect();
        let shift = grid.shift;
        let blend = self.blend;
        grid.par_update(|i, j, v| {
            let p = Vec2::new(i as f32, j as f32) + shift;
            for (d, b) in self.drawables.iter().zip(&bounds) {
                if d.reaches(b, p, d.extent) {
                    *v = blend.apply(*v, d.signed_distance(p));
                }
            }
        });
    }

    /// Calls `write` for every sample covered by a drawable, in drawable order.
    pub fn render_coverage<T: Copy + Send + Sync>(
        &self,
        grid: &mut Grid<T>,
        write: impl Fn(&Drawable, &mut T) + Sync + Send,
    ) {
        let bounds: Vec<_> = self.drawables.iter().map(|d| d.bounds()).collect();
        let shift = grid.shift;
        grid.par_update(|i, j, v| {
            let p = Vec2::new(i as f32, j as f32) + shift;
            for (d, b) in self.drawables.iter().zip(&bounds) {
                if d.reaches(b, p, 0.0) && d.covers(p) {
                    write(d, v);
                }
            }
        });
    }
}
