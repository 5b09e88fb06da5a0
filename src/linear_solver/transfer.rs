use rayon::prelude::*;

/// Restricts a fine level vector onto the next coarser level. Each coarse cell
/// averages the active cells of its 2x2 fine block, coarse cells outside the
/// coarse system are set to zero.
pub fn restrict(
    fine_size: [usize; 2],
    fine_diagonal: &[f32],
    fine: &[f32],
    coarse_size: [usize; 2],
    coarse_diagonal: &[f32],
    coarse: &mut [f32],
) {
    coarse.par_iter_mut().enumerate().for_each(|(c, out)| {
        if coarse_diagonal[c] == 0.0 {
            *out = 0.0;
            return;
        }
        let (i, j) = (c % coarse_size[0], c / coarse_size[0]);
        let mut sum = 0.0;
        let mut count = 0.0f32;
        for (di, dj) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            let (fi, fj) = (2 * i + di, 2 * j + dj);
            if fi >= fine_size[0] || fj >= fine_size[1] {
                continue;
            }
            let f = fi + fj * fine_size[0];
            if fine_diagonal[f] != 0.0 {
                sum += fine[f];
                count += 1.0;
            }
        }
        *out = sum / count.max(1.0);
    });
}

/// Adds the coarse correction onto the active fine cells (piecewise constant).
pub fn prolongate(
    coarse_size: [usize; 2],
    coarse: &[f32],
    fine_size: [usize; 2],
    fine_diagonal: &[f32],
    fine: &mut [f32],
) {
    fine.par_iter_mut().enumerate().for_each(|(f, out)| {
        if fine_diagonal[f] == 0.0 {
            return;
        }
        let (i, j) = (f % fine_size[0] / 2, f / fine_size[0] / 2);
        if i < coarse_size[0] && j < coarse_size[1] {
            *out += coarse[i + j * coarse_size[0]];
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restrict_averages_blocks() {
        let fine: Vec<f32> = (1..=16).map(|x| x as f32).collect();
        let mut coarse = vec![0.0; 4];
        restrict([4, 4], &[1.0; 16], &fine, [2, 2], &[1.0; 4], &mut coarse);
        assert_eq!(coarse[0], (1.0 + 2.0 + 5.0 + 6.0) / 4.0);
        assert_eq!(coarse[3], (11.0 + 12.0 + 15.0 + 16.0) / 4.0);
    }

    #[test]
    fn restrict_skips_inactive_cells() {
        let fine = vec![2.0; 16];
        let mut fine_diagonal = vec![1.0; 16];
        fine_diagonal[0] = 0.0;
        fine_diagonal[1] = 0.0;
        let mut coarse = vec![9.0; 4];
        restrict([4, 4], &fine_diagonal, &fine, [2, 2], &[1.0, 1.0, 0.0, 1.0], &mut coarse);
        assert_eq!(coarse, vec![2.0, 2.0, 0.0, 2.0]);
    }

    #[test]
    fn prolongate_adds_to_active_cells() {
        let coarse = vec![1.0, 2.0, 3.0, 4.0];
        let mut fine = vec![1.0; 16];
        let mut fine_diagonal = vec![1.0; 16];
        fine_diagonal[15] = 0.0;
        prolongate([2, 2], &coarse, [4, 4], &fine_diagonal, &mut fine);
        assert_eq!(fine[0], 2.0);
        assert_eq!(fine[5], 2.0);
        assert_eq!(fine[2], 3.0);
        assert_eq!(fine[8], 4.0);
        assert_eq!(fine[10], 5.0);
        assert_eq!(fine[15], 1.0);
    }
}
