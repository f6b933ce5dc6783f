//! Contiguous train/test splitting.

/// Split `items` into a train prefix of `floor(train_fraction * len)` items and a test suffix.
///
/// The listing is not shuffled; `train ++ test` reproduces the input order.
pub fn split_contiguous<T: Clone>(items: &[T], train_fraction: f64) -> (Vec<T>, Vec<T>) {
    let fraction = if train_fraction.is_nan() {
        0.0
    } else {
        train_fraction.clamp(0.0, 1.0)
    };
    let train_len = ((fraction * items.len() as f64).floor() as usize).min(items.len());
    let (train, test) = items.split_at(train_len);
    (train.to_vec(), test.to_vec())
}
