use std::ops::Range;

use rayon::prelude::*;

use crate::device::Device;

pub const PAR_REDUCE_BLOCK_SIZE: usize = 1024;

/// Blocked parallel reductions. Each block writes one partial into a scratch
/// buffer borrowed from the device, the partials are then folded in order,
/// so the result does not depend on the thread count.
#[derive(Clone)]
pub struct Reduce {
    device: Device,
}

impl Reduce {
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    fn blocked(
        &self,
        n: usize,
        init: f32,
        block: impl Fn(Range<usize>) -> f32 + Sync + Send,
        combine: fn(f32, f32) -> f32,
    ) -> f32 {
        if n == 0 {
            return init;
        }
        let blocks = (n + PAR_REDUCE_BLOCK_SIZE - 1) / PAR_REDUCE_BLOCK_SIZE;
        self.device.with_scratch(blocks, |partials| {
            let block = &block;
            self.device.install(|| {
                partials.par_iter_mut().enumerate().for_each(|(b, out)| {
                    let start = b * PAR_REDUCE_BLOCK_SIZE;
                    *out = block(start..(start + PAR_REDUCE_BLOCK_SIZE).min(n));
                })
            });
            partials.iter().copied().fold(init, combine)
        })
    }

    pub fn sum(&self, a: &[f32]) -> f32 {
        self.blocked(a.len(), 0.0, |r| a[r].iter().sum(), |x, y| x + y)
    }

    /// Largest absolute value, 0 for an empty input.
    pub fn max(&self, a: &[f32]) -> f32 {
        self.blocked(
            a.len(),
            0.0,
            |r| a[r].iter().fold(0.0f32, |m, x| m.max(x.abs())),
            f32::max,
        )
    }

    pub fn dot(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        self.blocked(
            a.len(),
            0.0,
            |r| a[r.clone()].iter().zip(&b[r]).map(|(x, y)| x * y).sum(),
            |x, y| x + y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_of_ones() {
        let reduce = Reduce::new(Device::cpu().unwrap());
        let a: Vec<f32> = (1..=150).map(|x| x as f32).collect();
        assert_eq!(reduce.sum(&a), 11325.0);
        assert_eq!(reduce.sum(&[]), 0.0);
    }

    #[test]
    fn max_is_absolute() {
        let reduce = Reduce::new(Device::cpu().unwrap());
        let mut a = vec![0.5f32; 3000];
        a[2047] = -7.0;
        assert_eq!(reduce.max(&a), 7.0);
    }

    #[test]
    fn dot_matches_serial() {
        let reduce = Reduce::new(Device::cpu().unwrap());
        let a: Vec<f32> = (0..2500).map(|x| (x % 7) as f32).collect();
        let b: Vec<f32> = (0..2500).map(|x| (x % 3) as f32).collect();
        let expected: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert_eq!(reduce.dot(&a, &b), expected);
    }
}
