//! Test data generators for creating synthetic field payloads.
//!
//! These generators create predictable, verifiable value patterns that
//! can be used across the test suite.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being moved correctly
/// (for example by a longitude roll) by checking that
/// `grid[row * width + col] == col * 1000 + row`.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f64);
        }
    }
    data
}

/// Creates a test grid with temperature-like values in Kelvin.
///
/// Values range from 250K (top-left) to about 310K (bottom-right).
pub fn create_temperature_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f64 / width.max(1) as f64;
            let y_factor = row as f64 / height.max(1) as f64;
            data.push(250.0 + (x_factor * 30.0) + (y_factor * 30.0));
        }
    }
    data
}

/// Creates a field that varies linearly in both directions.
///
/// Bilinear interpolation reproduces such a field exactly, which makes it
/// the reference input for regridding tests.
pub fn create_linear_grid(width: usize, height: usize, a: f64, b: f64, c: f64) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push(a * col as f64 + b * row as f64 + c);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(4, 3);
        assert_eq!(grid.len(), 12);
        assert_eq!(grid[2 * 4 + 3], 3002.0);
    }

    #[test]
    fn test_temperature_range() {
        let grid = create_temperature_grid(10, 10);
        assert!(grid.iter().all(|t| (250.0..=310.0).contains(t)));
    }

    #[test]
    fn test_linear_grid() {
        let grid = create_linear_grid(3, 2, 1.0, 10.0, 0.5);
        assert_eq!(grid, vec![0.5, 1.5, 2.5, 10.5, 11.5, 12.5]);
    }
}
