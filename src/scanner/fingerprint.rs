//! # Rolling Fingerprint
//!
//! A 16-bit Adler-style checksum over a window of bytes. With the oldest
//! byte at index 0 and `W` the window length:
//!
//! ```text
//! a = sum(x[j])
//! b = sum((W - j) * x[j])
//! fingerprint = low16(a) ^ rotl8(low16(b))
//! ```
//!
//! Both sums are kept modulo 2^32 so the window can slide one byte at a
//! time in O(1). The engine tracks one window per distinct block size and
//! keeps a trailing ring buffer as long as the largest window, so the exact
//! bytes behind any key it reports can be handed to the verifier.
//!
//! Each byte costs one roll per distinct block size. A catalog with many
//! sizes scans proportionally slower; the number of entries sharing a size
//! does not matter.

/// Running sums for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Sums {
    a: u32,
    b: u32,
}

impl Sums {
    #[inline]
    fn push(&mut self, byte: u8) {
        self.a = self.a.wrapping_add(byte as u32);
        self.b = self.b.wrapping_add(self.a);
    }

    #[inline]
    fn roll(&mut self, out: u8, byte: u8, window: u32) {
        self.a = self.a.wrapping_sub(out as u32).wrapping_add(byte as u32);
        self.b = self
            .b
            .wrapping_sub(window.wrapping_mul(out as u32))
            .wrapping_add(self.a);
    }

    #[inline]
    fn key(&self) -> u16 {
        (self.a as u16) ^ (self.b as u16).rotate_left(8)
    }
}

/// Fingerprint of a complete block.
pub fn fingerprint(data: &[u8]) -> u16 {
    let mut acc = FingerprintAccumulator::new();
    acc.update(data);
    acc.finish()
}

/// Incremental fingerprint of a block fed in pieces.
#[derive(Debug, Clone, Default)]
pub struct FingerprintAccumulator {
    sums: Sums,
}

impl FingerprintAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.sums.push(byte);
        }
    }

    pub fn finish(&self) -> u16 {
        self.sums.key()
    }
}

/// Key emitted for one tracked window size at the current stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowKey {
    pub size: u64,
    pub key: u16,
}

#[derive(Debug, Clone)]
struct Window {
    size: usize,
    sums: Sums,
}

/// Slides one window per tracked size over a byte stream.
#[derive(Debug, Clone)]
pub struct FingerprintEngine {
    windows: Vec<Window>,
    ring: Vec<u8>,
    head: usize,
    consumed: u64,
    ready: Vec<WindowKey>,
}

impl FingerprintEngine {
    /// Build an engine for the given window sizes. Zero sizes and
    /// duplicates are ignored.
    pub fn new(sizes: &[u64]) -> Self {
        let mut sizes: Vec<usize> = sizes
            .iter()
            .filter(|&&s| s > 0)
            .map(|&s| usize::try_from(s).unwrap_or(usize::MAX))
            .collect();
        sizes.sort_unstable();
        sizes.dedup();
        let capacity = sizes.last().copied().unwrap_or(0);
        Self {
            ready: Vec::with_capacity(sizes.len()),
            windows: sizes
                .into_iter()
                .map(|size| Window {
                    size,
                    sums: Sums::default(),
                })
                .collect(),
            ring: vec![0u8; capacity],
            head: 0,
            consumed: 0,
        }
    }

    /// Forget all stream state, keeping the allocations.
    pub fn reset(&mut self) {
        for window in &mut self.windows {
            window.sums = Sums::default();
        }
        self.head = 0;
        self.consumed = 0;
        self.ready.clear();
    }

    /// Number of bytes fed since the last reset.
    pub fn position(&self) -> u64 {
        self.consumed
    }

    pub fn window_sizes(&self) -> impl Iterator<Item = u64> + '_ {
        self.windows.iter().map(|w| w.size as u64)
    }

    /// Consume one byte and return the keys of every window that is full
    /// at this position, smallest size first.
    #[inline]
    pub fn feed(&mut self, byte: u8) -> &[WindowKey] {
        self.ready.clear();
        let capacity = self.ring.len();
        if capacity == 0 {
            self.consumed += 1;
            return &self.ready;
        }

        for window in &mut self.windows {
            if self.consumed >= window.size as u64 {
                let out = self.ring[(self.head + capacity - window.size) % capacity];
                window.sums.roll(out, byte, window.size as u32);
            } else {
                window.sums.push(byte);
            }
        }

        self.ring[self.head] = byte;
        self.head = (self.head + 1) % capacity;
        self.consumed += 1;

        for window in &self.windows {
            if self.consumed < window.size as u64 {
                // Sizes are sorted, no larger window is full either.
                break;
            }
            self.ready.push(WindowKey {
                size: window.size as u64,
                key: window.sums.key(),
            });
        }
        &self.ready
    }

    /// Keys reported by the most recent [`feed`](Self::feed).
    pub fn ready(&self) -> &[WindowKey] {
        &self.ready
    }

    /// The trailing `size` bytes ending at the current position, as up to
    /// two slices in stream order. `None` if fewer bytes were fed or the
    /// size exceeds the largest tracked window.
    pub fn trailing(&self, size: u64) -> Option<(&[u8], &[u8])> {
        let capacity = self.ring.len();
        let size = usize::try_from(size).ok()?;
        if size == 0 || size > capacity || self.consumed < size as u64 {
            return None;
        }
        let start = (self.head + capacity - size) % capacity;
        if start < self.head {
            Some((&self.ring[start..self.head], &self.ring[..0]))
        } else {
            Some((&self.ring[start..], &self.ring[..self.head]))
        }
    }
}
