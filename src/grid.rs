use glam::Vec2;
use rayon::prelude::*;

use crate::error::{Error, Result};

/// Dense 2D field. Sample `(i, j)` sits at grid-space position `(i, j) + shift`,
/// so cell centred fields use a shift of `(0.5, 0.5)` and MAC faces use
/// `(0, 0.5)` / `(0.5, 0)`.
#[derive(Clone, Debug)]
pub struct Grid<T> {
    pub values: Vec<T>,
    pub res: [usize; 2],
    pub shift: Vec2,
}

pub const CELL_CENTRED: Vec2 = Vec2::new(0.5, 0.5);
pub const U_FACES: Vec2 = Vec2::new(0.0, 0.5);
pub const V_FACES: Vec2 = Vec2::new(0.5, 0.0);

impl<T: Copy + Send + Sync> Grid<T> {
    pub fn new(res: [usize; 2], shift: Vec2, fill: T) -> Result<Self> {
        if res[0] == 0 || res[1] == 0 {
            return Err(Error::InvalidSize(res[0], res[1]));
        }
        Ok(Self {
            values: vec![fill; res[0] * res[1]],
            res,
            shift,
        })
    }
    pub fn from_vec(res: [usize; 2], shift: Vec2, values: Vec<T>) -> Result<Self> {
        if res[0] == 0 || res[1] == 0 {
            return Err(Error::InvalidSize(res[0], res[1]));
        }
        if values.len() != res[0] * res[1] {
            return Err(Error::SizeMismatch {
                expected: res[0] * res[1],
                actual: values.len(),
            });
        }
        Ok(Self { values, res, shift })
    }
    #[inline]
    pub fn linear_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.res[0] && j < self.res[1]);
        i + j * self.res[0]
    }
    #[inline]
    pub fn at_index(&self, i: usize, j: usize) -> T {
        self.values[self.linear_index(i, j)]
    }
    #[inline]
    pub fn at_clamped(&self, i: i32, j: i32) -> T {
        let i = i.clamp(0, self.res[0] as i32 - 1) as usize;
        let j = j.clamp(0, self.res[1] as i32 - 1) as usize;
        self.at_index(i, j)
    }
    #[inline]
    pub fn set_index(&mut self, i: usize, j: usize, v: T) {
        let index = self.linear_index(i, j);
        self.values[index] = v;
    }
    #[inline]
    pub fn oob(&self, i: i32, j: i32) -> bool {
        i < 0 || j < 0 || i >= self.res[0] as i32 || j >= self.res[1] as i32
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn fill(&mut self, v: T) {
        self.values.par_iter_mut().for_each(|x| *x = v);
    }
    pub fn copy_from(&mut self, other: &Grid<T>) {
        debug_assert_eq!(self.res, other.res);
        self.values.par_iter_mut().zip(other.values.par_iter()).for_each(|(a, b)| *a = *b);
    }
    /// Writes every sample from `f(i, j)`, one row per task.
    pub fn par_fill_with(&mut self, f: impl Fn(usize, usize) -> T + Sync + Send) {
        let w = self.res[0];
        self.values
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(j, row)| {
                for (i, v) in row.iter_mut().enumerate() {
                    *v = f(i, j);
                }
            });
    }
    pub fn par_update(&mut self, f: impl Fn(usize, usize, &mut T) + Sync + Send) {
        let w = self.res[0];
        self.values
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(j, row)| {
                for (i, v) in row.iter_mut().enumerate() {
                    f(i, j, v);
                }
            });
    }
}

/// Splits a grid-space coordinate into a base sample and a fractional offset,
/// clamped so that `base + 1` is still inside `0..n`.
#[inline]
fn locate(q: f32, n: usize) -> (usize, f32) {
    if n < 2 {
        return (0, 0.0);
    }
    let q = q.clamp(0.0, (n - 1) as f32);
    let i = (q.floor() as usize).min(n - 2);
    (i, q - i as f32)
}

#[inline]
fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

impl Grid<f32> {
    pub fn at_index_or_zero(&self, i: i32, j: i32) -> f32 {
        if self.oob(i, j) {
            0.0
        } else {
            self.at_index(i as usize, j as usize)
        }
    }
    pub fn bilinear(&self, p: Vec2) -> f32 {
        let q = p - self.shift;
        let (i, fx) = locate(q.x, self.res[0]);
        let (j, fy) = locate(q.y, self.res[1]);
        let i1 = (i + 1).min(self.res[0] - 1);
        let j1 = (j + 1).min(self.res[1] - 1);
        let v00 = self.at_index(i, j);
        let v10 = self.at_index(i1, j);
        let v01 = self.at_index(i, j1);
        let v11 = self.at_index(i1, j1);
        let v0 = (1.0 - fx) * v00 + fx * v10;
        let v1 = (1.0 - fx) * v01 + fx * v11;
        (1.0 - fy) * v0 + fy * v1
    }
    /// Catmull-Rom interpolation clamped to the range of the four nearest
    /// samples, which removes the overshoot of the unclamped spline.
    pub fn cubic(&self, p: Vec2) -> f32 {
        let q = p - self.shift;
        let (i, fx) = locate(q.x, self.res[0]);
        let (j, fy) = locate(q.y, self.res[1]);
        let (i, j) = (i as i32, j as i32);
        let mut rows = [0.0f32; 4];
        for (k, row) in rows.iter_mut().enumerate() {
            let y = j - 1 + k as i32;
            *row = catmull_rom(
                self.at_clamped(i - 1, y),
                self.at_clamped(i, y),
                self.at_clamped(i + 1, y),
                self.at_clamped(i + 2, y),
                fx,
            );
        }
        let v = catmull_rom(rows[0], rows[1], rows[2], rows[3], fy);
        let corners = [
            self.at_clamped(i, j),
            self.at_clamped(i + 1, j),
            self.at_clamped(i, j + 1),
            self.at_clamped(i + 1, j + 1),
        ];
        let lo = corners.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = corners.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        v.clamp(lo, hi)
    }
    /// Gradient of the bilinear interpolant, per grid cell.
    pub fn gradient(&self, p: Vec2) -> Vec2 {
        let q = p - self.shift;
        let (i, fx) = locate(q.x, self.res[0]);
        let (j, fy) = locate(q.y, self.res[1]);
        let i1 = (i + 1).min(self.res[0] - 1);
        let j1 = (j + 1).min(self.res[1] - 1);
        let v00 = self.at_index(i, j);
        let v10 = self.at_index(i1, j);
        let v01 = self.at_index(i, j1);
        let v11 = self.at_index(i1, j1);
        let ddx0 = v10 - v00;
        let ddx1 = v11 - v01;
        let ddy0 = v01 - v00;
        let ddy1 = v11 - v10;
        Vec2::new((1.0 - fy) * ddx0 + fy * ddx1, (1.0 - fx) * ddy0 + fx * ddy1)
    }
    pub fn abs_max(&self) -> f32 {
        self.values.par_iter().map(|x| x.abs()).reduce(|| 0.0, f32::max)
    }
}

/// A front/back pair of buffers. Passes read the front and write the back,
/// `swap` exchanges which slot is the front.
#[derive(Clone, Debug)]
pub struct PingPong<T> {
    buffers: [T; 2],
    front: usize,
}

impl<T> PingPong<T> {
    pub fn new(front: T, back: T) -> Self {
        Self {
            buffers: [front, back],
            front: 0,
        }
    }
    pub fn front(&self) -> &T {
        &self.buffers[self.front]
    }
    pub fn front_mut(&mut self) -> &mut T {
        &mut self.buffers[self.front]
    }
    pub fn back(&self) -> &T {
        &self.buffers[self.front ^ 1]
    }
    pub fn back_mut(&mut self) -> &mut T {
        &mut self.buffers[self.front ^ 1]
    }
    /// Front for reading, back for writing.
    pub fn split(&mut self) -> (&T, &mut T) {
        let (a, b) = self.buffers.split_at_mut(1);
        if self.front == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        }
    }
    pub fn swap(&mut self) {
        self.front ^= 1;
    }
}
