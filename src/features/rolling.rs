//! Trailing-window statistics and one-step edge handling.
//!
//! A window only ever sees the current sample and the samples before it,
//! so no feature looks ahead in time. Every statistic is defined from the
//! first sample on: a window holding fewer than two values has a standard
//! deviation of 0.0.

use std::collections::VecDeque;

/// Mean and sample standard deviation of the values currently in a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std: f64,
}

/// Fixed-capacity trailing window.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    size: usize,
    buf: VecDeque<f64>,
}

impl RollingWindow {
    /// A window of `size` samples. A size of 0 is treated as 1.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            buf: VecDeque::with_capacity(size),
        }
    }

    /// Slide the window forward by one sample and report its statistics.
    pub fn push(&mut self, value: f64) -> WindowStats {
        if self.buf.len() == self.size {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
        self.stats()
    }

    /// Two-pass mean/variance over the window contents (n-1 denominator).
    pub fn stats(&self) -> WindowStats {
        let n = self.buf.len();
        if n == 0 {
            return WindowStats { mean: 0.0, std: 0.0 };
        }
        let mean = self.buf.iter().sum::<f64>() / n as f64;
        let std = if n < 2 {
            0.0
        } else {
            let ss: f64 = self.buf.iter().map(|x| (x - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        };
        WindowStats { mean, std }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Iterator adapter yielding trailing-window statistics for each input value.
#[derive(Debug, Clone)]
pub struct Rolling<I> {
    inner: I,
    window: RollingWindow,
}

impl<I: Iterator<Item = f64>> Iterator for Rolling<I> {
    type Item = WindowStats;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|v| self.window.push(v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// `values.rolling(size)` in iterator form.
pub fn rolling<I>(values: I, size: usize) -> Rolling<I::IntoIter>
where
    I: IntoIterator<Item = f64>,
{
    Rolling {
        inner: values.into_iter(),
        window: RollingWindow::new(size),
    }
}

/// Previous value at each position. The first position has no predecessor
/// and takes the next defined lag, which is the first value itself.
pub fn lag1(values: &[f64]) -> Vec<f64> {
    match values.first() {
        None => Vec::new(),
        Some(&first) => std::iter::once(first)
            .chain(values.iter().take(values.len() - 1).copied())
            .collect(),
    }
}

/// `value[t] - value[t-1]`. The first position takes the next defined
/// difference; a single-sample series has nothing to borrow from and gets 0.0.
pub fn first_difference(values: &[f64]) -> Vec<f64> {
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    match diffs.first() {
        None => vec![0.0; values.len()],
        Some(&first) => std::iter::once(first).chain(diffs.iter().copied()).collect(),
    }
}
