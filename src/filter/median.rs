// src/filter/median.rs

//! # Order-Statistic (Median) Filter
//!
//! A fixed-size sliding-window median filter. The window is kept sorted at
//! all times. Each new sample overwrites the oldest one in place and is then
//! walked left or right until it reaches its rank, so an insertion costs a
//! handful of swaps on slowly changing sensor data instead of a full sort.
//!
//! Two index maps link the sorted window to insertion age:
//!
//! - `age_to_sorted[age]` is the sorted position of the sample inserted at
//!   ring slot `age`.
//! - `sorted_to_age[pos]` is the ring slot of the sample at sorted position
//!   `pos`.
//!
//! The maps are inverse permutations of `0..window_size` after every call.
//! Storage is a fixed array of [`MAX_WINDOW`] entries so the filter needs no
//! allocator.

/// Smallest accepted window.
pub const MIN_WINDOW: usize = 3;

/// Largest accepted window. Indexes are stored as `u8`.
pub const MAX_WINDOW: usize = 255;

/// Sliding-window median tracker.
#[derive(Debug, Clone)]
pub struct OrderStatisticFilter<T> {
    window: [T; MAX_WINDOW],
    age_to_sorted: [u8; MAX_WINDOW],
    sorted_to_age: [u8; MAX_WINDOW],
    size: usize,
    middle: usize,
    oldest: usize,
}

impl<T: Copy + PartialOrd> OrderStatisticFilter<T> {
    /// Creates a filter of `window_size` samples, every one set to `seed`.
    ///
    /// The size is clamped to `[MIN_WINDOW, MAX_WINDOW]` rather than
    /// rejected. Use an odd size: for an even size the reported value is
    /// the upper of the two middle samples.
    pub fn new(window_size: usize, seed: T) -> Self {
        let size = window_size.clamp(MIN_WINDOW, MAX_WINDOW);

        let mut age_to_sorted = [0u8; MAX_WINDOW];
        let mut sorted_to_age = [0u8; MAX_WINDOW];
        for (i, (a, s)) in age_to_sorted
            .iter_mut()
            .zip(sorted_to_age.iter_mut())
            .enumerate()
            .take(size)
        {
            *a = i as u8;
            *s = i as u8;
        }

        Self {
            window: [seed; MAX_WINDOW],
            age_to_sorted,
            sorted_to_age,
            size,
            middle: size >> 1,
            oldest: 0,
        }
    }

    /// Replaces the oldest sample with `value` and returns the new median.
    pub fn insert(&mut self, value: T) -> T {
        let mut pos = self.age_to_sorted[self.oldest] as usize;
        self.window[pos] = value;

        let mut moved = false;
        while pos > 0 && self.window[pos] < self.window[pos - 1] {
            self.swap_sorted(pos, pos - 1);
            pos -= 1;
            moved = true;
        }

        if !moved {
            while pos + 1 < self.size && self.window[pos] > self.window[pos + 1] {
                self.swap_sorted(pos, pos + 1);
                pos += 1;
            }
        }

        self.oldest += 1;
        if self.oldest >= self.size {
            self.oldest = 0;
        }

        self.window[self.middle]
    }

    /// Current median. Does not modify the filter.
    pub fn read(&self) -> T {
        self.window[self.middle]
    }

    /// Number of samples in the window after clamping.
    pub fn window_size(&self) -> usize {
        self.size
    }

    /// Sorted contents of the window.
    pub fn sorted(&self) -> &[T] {
        &self.window[..self.size]
    }

    // Swaps two neighbouring sorted slots and keeps both maps in step.
    fn swap_sorted(&mut self, a: usize, b: usize) {
        self.window.swap(a, b);

        let age_a = self.sorted_to_age[a];
        let age_b = self.sorted_to_age[b];
        self.sorted_to_age[a] = age_b;
        self.sorted_to_age[b] = age_a;
        self.age_to_sorted[age_a as usize] = b as u8;
        self.age_to_sorted[age_b as usize] = a as u8;
    }
}
