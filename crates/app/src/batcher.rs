//! Greedy, order-preserving embedding batcher.

use code_index_domain::{CodeBlock, EmbeddingBatch, EmbeddingLimits};

/// Groups blocks into batches within the provider's token budget.
#[derive(Debug)]
pub struct Batcher {
    limits: EmbeddingLimits,
    pending: Vec<CodeBlock>,
    pending_tokens: usize,
}

impl Batcher {
    /// Empty batcher for `limits`.
    pub const fn new(limits: EmbeddingLimits) -> Self {
        Self {
            limits,
            pending: Vec::new(),
            pending_tokens: 0,
        }
    }

    /// Add a block; returns the batches this block closed, in order.
    pub fn push(&mut self, block: CodeBlock) -> Vec<EmbeddingBatch> {
        let tokens = block.token_estimate();
        let mut closed = Vec::new();
        if tokens > self.limits.max_item_tokens || tokens > self.limits.max_batch_tokens {
            closed.extend(self.flush());
            closed.push(EmbeddingBatch {
                items: vec![block],
                total_token_estimate: tokens,
                oversized: true,
            });
            return closed;
        }
        let over_budget = self.pending_tokens + tokens > self.limits.max_batch_tokens;
        let over_count = self.pending.len() >= self.limits.max_items_per_batch.max(1);
        if !self.pending.is_empty() && (over_budget || over_count) {
            closed.extend(self.flush());
        }
        self.pending_tokens += tokens;
        self.pending.push(block);
        closed
    }

    /// Close the pending batch, if any.
    pub fn flush(&mut self) -> Option<EmbeddingBatch> {
        if self.pending.is_empty() {
            return None;
        }
        Some(EmbeddingBatch {
            items: std::mem::take(&mut self.pending),
            total_token_estimate: std::mem::replace(&mut self.pending_tokens, 0),
            oversized: false,
        })
    }

    /// Number of blocks waiting for a batch.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Batch a whole block sequence.
pub fn batch_blocks(
    limits: EmbeddingLimits,
    blocks: impl IntoIterator<Item = CodeBlock>,
) -> Vec<EmbeddingBatch> {
    let mut batcher = Batcher::new(limits);
    let mut batches: Vec<EmbeddingBatch> = blocks
        .into_iter()
        .flat_map(|block| batcher.push(block))
        .collect();
    batches.extend(batcher.flush());
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_index_domain::{LineSpan, RelativePath};
    use proptest::prelude::*;

    fn block(line: u32, chars: usize) -> CodeBlock {
        CodeBlock::new(
            RelativePath::parse("src/a.rs").expect("path"),
            LineSpan::new(line, line).expect("span"),
            "x".repeat(chars),
            false,
        )
    }

    fn limits(max_item: usize, max_batch: usize, max_items: usize) -> EmbeddingLimits {
        EmbeddingLimits {
            max_item_tokens: max_item,
            max_batch_tokens: max_batch,
            max_items_per_batch: max_items,
        }
    }

    #[test]
    fn closes_on_token_budget_in_input_order() {
        let batches = batch_blocks(limits(100, 10, 60), (1..=5).map(|line| block(line, 16)));
        let shapes: Vec<(Vec<u32>, usize)> = batches
            .iter()
            .map(|batch| {
                let lines = batch.items.iter().map(|item| item.span.start_line()).collect();
                (lines, batch.total_token_estimate)
            })
            .collect();
        assert_eq!(shapes, vec![(vec![1, 2], 8), (vec![3, 4], 8), (vec![5], 4)]);
    }

    #[test]
    fn closes_on_item_count() {
        let batches = batch_blocks(limits(100, 1_000, 2), (1..=5).map(|line| block(line, 4)));
        let sizes: Vec<usize> = batches.iter().map(EmbeddingBatch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn oversized_item_flushes_pending_and_goes_alone() {
        let blocks = vec![block(1, 8), block(2, 400), block(3, 8)];
        let batches = batch_blocks(limits(50, 1_000, 60), blocks);
        assert_eq!(batches.len(), 3);
        assert!(!batches[0].oversized);
        assert!(batches[1].oversized);
        assert_eq!(batches[1].items[0].span.start_line(), 2);
        assert_eq!(batches[1].total_token_estimate, 100);
        assert_eq!(batches[2].items[0].span.start_line(), 3);
    }

    proptest! {
        #[test]
        fn batches_stay_within_budget(
            sizes in prop::collection::vec(1usize..2_000, 0..200),
            max_item in 50usize..400,
            max_batch in 100usize..2_000,
            max_items in 1usize..80,
        ) {
            let limits = limits(max_item, max_batch, max_items);
            let blocks: Vec<CodeBlock> = sizes
                .iter()
                .enumerate()
                .map(|(index, chars)| block(u32::try_from(index + 1).unwrap_or(1), *chars))
                .collect();
            let batches = batch_blocks(limits, blocks);

            let order: Vec<u32> = batches
                .iter()
                .flat_map(|batch| batch.items.iter().map(|item| item.span.start_line()))
                .collect();
            let expected: Vec<u32> = (1..=u32::try_from(sizes.len()).unwrap_or(0)).collect();
            prop_assert_eq!(order, expected);

            for batch in &batches {
                prop_assert!(!batch.is_empty());
                if batch.oversized {
                    prop_assert_eq!(batch.len(), 1);
                    continue;
                }
                let total: usize = batch.items.iter().map(CodeBlock::token_estimate).sum();
                prop_assert_eq!(total, batch.total_token_estimate);
                prop_assert!(total <= max_batch);
                prop_assert!(batch.len() <= max_items);
                prop_assert!(batch.items.iter().all(|item| item.token_estimate() <= max_item));
            }
        }
    }
}
