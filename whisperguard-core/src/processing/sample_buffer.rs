use std::collections::VecDeque;

/// A contiguous run of normalized mono samples in `[-1.0, 1.0]`.
///
/// Blocks are never mutated once built; splitting one produces new blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBlock {
    samples: Vec<f32>,
}

impl SampleBlock {
    /// Copy samples out of a buffer the caller may reuse.
    pub fn from_slice(samples: &[f32]) -> Self {
        Self {
            samples: samples.to_vec(),
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.samples
    }

    /// Split at `at`, returning `(head, residual)`.
    fn split(mut self, at: usize) -> (Self, Self) {
        let residual = self.samples.split_off(at);
        (self, Self { samples: residual })
    }
}

impl From<Vec<f32>> for SampleBlock {
    fn from(samples: Vec<f32>) -> Self {
        Self { samples }
    }
}

/// FIFO queue of variable-length sample blocks with exact-length extraction.
///
/// The concatenation of the queued blocks is always the unconsumed part of
/// the stream: nothing is reordered, dropped, or duplicated. Unlike a ring
/// buffer it never overwrites; memory grows until samples are extracted.
/// Wrap in `Arc<parking_lot::Mutex<SampleBuffer>>` for cross-thread access.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    blocks: VecDeque<SampleBlock>,
    total: usize,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block at the tail. Empty blocks are ignored.
    pub fn append(&mut self, block: SampleBlock) {
        if block.is_empty() {
            return;
        }
        self.total += block.len();
        self.blocks.push_back(block);
    }

    /// Total number of buffered samples across all blocks.
    pub fn total_len(&self) -> usize {
        self.total
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Remove exactly `n` samples from the head.
    ///
    /// Returns `None` and leaves the buffer untouched if fewer than `n`
    /// samples are buffered. A head block that straddles the boundary is
    /// split and its residual stays at the front for the next call.
    pub fn extract_exact(&mut self, n: usize) -> Option<SampleBlock> {
        if self.total < n {
            return None;
        }

        // Fast path: the head block is exactly the window.
        if self.blocks.front().is_some_and(|b| b.len() == n) {
            self.total -= n;
            return self.blocks.pop_front();
        }

        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let Some(block) = self.blocks.pop_front() else {
                break;
            };
            let take = block.len().min(n - out.len());
            if take < block.len() {
                let (head, residual) = block.split(take);
                out.extend_from_slice(head.as_slice());
                self.blocks.push_front(residual);
            } else {
                out.extend_from_slice(block.as_slice());
            }
        }

        debug_assert_eq!(out.len(), n);
        self.total -= n;
        Some(SampleBlock::from(out))
    }

    /// Remove everything buffered as one block.
    pub fn drain_all(&mut self) -> SampleBlock {
        let n = self.total;
        self.extract_exact(n).unwrap_or_default()
    }

    /// Discard everything buffered, returning how many samples were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.total;
        self.blocks.clear();
        self.total = 0;
        dropped
    }

    /// Copy of the buffered samples in order, without consuming them.
    pub fn snapshot(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.total);
        for block in &self.blocks {
            out.extend_from_slice(block.as_slice());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> SampleBlock {
        SampleBlock::from((start..start + len).map(|i| i as f32).collect::<Vec<_>>())
    }

    fn fill(lengths: &[usize]) -> (SampleBuffer, Vec<f32>) {
        let mut buf = SampleBuffer::new();
        let mut all = Vec::new();
        let mut next = 0;
        for &len in lengths {
            let block = ramp(next, len);
            all.extend_from_slice(block.as_slice());
            buf.append(block);
            next += len;
        }
        (buf, all)
    }

    #[test]
    fn append_tracks_total() {
        let (buf, _) = fill(&[3, 5, 2]);
        assert_eq!(buf.total_len(), 10);
        assert_eq!(buf.block_count(), 3);
    }

    #[test]
    fn empty_blocks_are_ignored() {
        let mut buf = SampleBuffer::new();
        buf.append(SampleBlock::default());
        assert!(buf.is_empty());
        assert_eq!(buf.block_count(), 0);
    }

    #[test]
    fn insufficient_leaves_buffer_untouched() {
        let (mut buf, all) = fill(&[4, 4]);
        assert!(buf.extract_exact(9).is_none());
        assert_eq!(buf.total_len(), 8);
        assert_eq!(buf.block_count(), 2);
        assert_eq!(buf.snapshot(), all);
    }

    #[test]
    fn extract_splits_head_and_keeps_residual() {
        let (mut buf, all) = fill(&[4, 4]);

        let first = buf.extract_exact(6).unwrap();
        assert_eq!(first.as_slice(), &all[..6]);
        assert_eq!(buf.total_len(), 2);
        assert_eq!(buf.block_count(), 1);

        let second = buf.extract_exact(2).unwrap();
        assert_eq!(second.as_slice(), &all[6..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn block_straddling_two_windows() {
        // One 10-sample block covers the end of window 1, all of window 2
        // and the start of window 3.
        let (mut buf, all) = fill(&[2, 10, 3]);

        let w1 = buf.extract_exact(4).unwrap();
        let w2 = buf.extract_exact(4).unwrap();
        let w3 = buf.extract_exact(4).unwrap();
        assert!(buf.extract_exact(4).is_none());

        let mut joined = w1.into_vec();
        joined.extend(w2.into_vec());
        joined.extend(w3.into_vec());
        assert_eq!(joined, &all[..12]);
        assert_eq!(buf.snapshot(), &all[12..]);
    }

    #[test]
    fn exact_head_block_is_returned_whole() {
        let (mut buf, all) = fill(&[5, 5]);
        let out = buf.extract_exact(5).unwrap();
        assert_eq!(out.as_slice(), &all[..5]);
        assert_eq!(buf.block_count(), 1);
    }

    #[test]
    fn extract_zero_returns_empty_block() {
        let (mut buf, _) = fill(&[3]);
        assert!(buf.extract_exact(0).unwrap().is_empty());
        assert_eq!(buf.total_len(), 3);
    }

    #[test]
    fn prefix_and_suffix_hold_for_all_split_points() {
        let lengths = [1, 7, 3, 4096, 2, 11];
        let total: usize = lengths.iter().sum();
        for n in [0, 1, 2, 8, 9, 11, 12, 100, 4107, 4108, total - 1, total] {
            let (mut buf, all) = fill(&lengths);
            let out = buf.extract_exact(n).unwrap();
            assert_eq!(out.as_slice(), &all[..n], "prefix mismatch at n={}", n);
            assert_eq!(buf.snapshot(), &all[n..], "suffix mismatch at n={}", n);
            assert_eq!(buf.total_len(), total - n);
        }
    }

    #[test]
    fn repeated_windows_cover_stream_without_gaps() {
        let lengths = [4096, 4096, 4096, 4096, 4096, 4096];
        let (mut buf, all) = fill(&lengths);

        let mut seen = Vec::new();
        while let Some(window) = buf.extract_exact(3000) {
            assert_eq!(window.len(), 3000);
            seen.extend(window.into_vec());
        }
        seen.extend(buf.snapshot());
        assert_eq!(seen, all);
    }

    #[test]
    fn drain_all_empties_buffer() {
        let (mut buf, all) = fill(&[3, 2, 9]);
        assert_eq!(buf.drain_all().into_vec(), all);
        assert!(buf.is_empty());
        assert!(buf.drain_all().is_empty());
    }

    #[test]
    fn clear_reports_dropped() {
        let (mut buf, _) = fill(&[3, 2]);
        assert_eq!(buf.clear(), 5);
        assert!(buf.is_empty());
        assert_eq!(buf.block_count(), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Any split point within the buffered total yields the exact
            /// prefix and leaves the exact suffix behind.
            #[test]
            fn extract_yields_prefix_and_keeps_suffix(
                lengths in prop::collection::vec(0usize..600, 0..12),
                pick in any::<prop::sample::Index>(),
            ) {
                let (mut buf, all) = fill(&lengths);
                let total = all.len();
                let n = pick.index(total + 1);

                let out = buf.extract_exact(n).unwrap();
                prop_assert_eq!(out.as_slice(), &all[..n]);
                prop_assert_eq!(buf.snapshot(), all[n..].to_vec());
                prop_assert_eq!(buf.total_len(), total - n);
            }

            #[test]
            fn oversized_request_leaves_buffer_unchanged(
                lengths in prop::collection::vec(0usize..600, 0..12),
                excess in 1usize..1000,
            ) {
                let (mut buf, all) = fill(&lengths);
                let blocks = buf.block_count();

                prop_assert!(buf.extract_exact(all.len() + excess).is_none());
                prop_assert_eq!(buf.total_len(), all.len());
                prop_assert_eq!(buf.block_count(), blocks);
                prop_assert_eq!(buf.snapshot(), all);
            }

            /// Fixed windows plus the residual rebuild the stream in order.
            #[test]
            fn repeated_windows_rebuild_stream(
                lengths in prop::collection::vec(0usize..600, 0..12),
                window in 1usize..700,
            ) {
                let (mut buf, all) = fill(&lengths);

                let mut seen = Vec::new();
                while let Some(chunk) = buf.extract_exact(window) {
                    prop_assert_eq!(chunk.len(), window);
                    seen.extend(chunk.into_vec());
                }
                prop_assert!(buf.total_len() < window);
                seen.extend(buf.snapshot());
                prop_assert_eq!(seen, all);
            }
        }
    }
}
