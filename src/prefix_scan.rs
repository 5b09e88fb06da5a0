use rayon::prelude::*;

use crate::device::{Device, DispatchParams};

/// Work-efficient blocked exclusive scan: block totals are scanned serially,
/// then each block scans itself from its offset in parallel.
#[derive(Clone)]
pub struct PrefixScan {
    device: Device,
    block_size: usize,
}

impl PrefixScan {
    pub const DEFAULT_BLOCK_SIZE: usize = 1024;

    pub fn new(device: Device) -> Self {
        Self::with_block_size(device, Self::DEFAULT_BLOCK_SIZE)
    }
    pub fn with_block_size(device: Device, block_size: usize) -> Self {
        Self {
            device,
            block_size: block_size.max(1),
        }
    }

    /// Writes the exclusive prefix sum of `input` to `output` and returns the
    /// dispatch size for the total.
    pub fn scan(&self, input: &[i32], output: &mut [i32]) -> DispatchParams {
        debug_assert_eq!(input.len(), output.len());
        let bs = self.block_size;
        let totals: Vec<i32> = self.device.install(|| input.par_chunks(bs).map(|c| c.iter().sum()).collect());
        let mut offsets = Vec::with_capacity(totals.len());
        let mut acc = 0i32;
        for t in &totals {
            offsets.push(acc);
            acc += t;
        }
        self.device.install(|| {
            output
                .par_chunks_mut(bs)
                .zip(input.par_chunks(bs))
                .zip(offsets.par_iter())
                .for_each(|((out, inp), offset)| {
                    let mut sum = *offset;
                    for (o, i) in out.iter_mut().zip(inp) {
                        *o = sum;
                        sum += i;
                    }
                });
        });
        DispatchParams::new(acc.max(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_scan_small() {
        let scan = PrefixScan::with_block_size(Device::cpu().unwrap(), 2);
        let input = [1, 2, 3, 4, 5];
        let mut output = [0; 5];
        let params = scan.scan(&input, &mut output);
        assert_eq!(output, [0, 1, 3, 6, 10]);
        assert_eq!(params.count, 15);
        assert_eq!(params.work_size, [1, 1, 1]);
    }

    #[test]
    fn empty_input() {
        let scan = PrefixScan::new(Device::cpu().unwrap());
        let params = scan.scan(&[], &mut []);
        assert_eq!(params.count, 0);
        assert_eq!(params.work_size, [0, 1, 1]);
    }
}
