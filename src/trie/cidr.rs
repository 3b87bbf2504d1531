//! 区间 → CIDR 分解

/// 把闭区间 `[start, end]` 拆成最少的对齐前缀块，返回 `(网络号, 前缀长度)`
///
/// `bits` 为地址位宽（v4 = 32，v6 = 128），数值放在低位。
/// `start > end` 时返回空列表。
pub fn range_to_cidrs(start: u128, end: u128, bits: u32) -> Vec<(u128, u8)> {
    let mut blocks = Vec::new();
    if start > end {
        return blocks;
    }

    let mut cur = start;
    loop {
        // 起点对齐允许的最大块
        let align = if cur == 0 {
            bits
        } else {
            cur.trailing_zeros().min(bits)
        };
        // 剩余长度允许的最大块
        let span = end - cur;
        let fit = if span == u128::MAX {
            128
        } else {
            127 - (span + 1).leading_zeros()
        };
        let size = align.min(fit);
        blocks.push((cur, (bits - size) as u8));

        if size >= 128 {
            break;
        }
        match cur.checked_add(1u128 << size) {
            Some(next) if next <= end => cur = next,
            _ => break,
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_block() {
        assert_eq!(
            range_to_cidrs(0x0100_0000, 0x0100_00ff, 32),
            vec![(0x0100_0000, 24)]
        );
    }

    #[test]
    fn test_single_address() {
        assert_eq!(range_to_cidrs(5, 5, 32), vec![(5, 32)]);
    }

    #[test]
    fn test_unaligned_range() {
        // 1.0.0.1 - 1.0.0.6 → /32 /31 /31 /32
        let base = 0x0100_0000u128;
        assert_eq!(
            range_to_cidrs(base + 1, base + 6, 32),
            vec![(base + 1, 32), (base + 2, 31), (base + 4, 31), (base + 6, 32)]
        );
    }

    #[test]
    fn test_full_spaces() {
        assert_eq!(range_to_cidrs(0, u32::MAX as u128, 32), vec![(0, 0)]);
        assert_eq!(range_to_cidrs(0, u128::MAX, 128), vec![(0, 0)]);
    }

    #[test]
    fn test_top_of_space_does_not_overflow() {
        let blocks = range_to_cidrs(u128::MAX - 3, u128::MAX, 128);
        assert_eq!(blocks, vec![(u128::MAX - 3, 126)]);
    }

    #[test]
    fn test_blocks_cover_exactly() {
        let (start, end) = (1000u128, 70_000u128);
        let blocks = range_to_cidrs(start, end, 32);
        let mut expected = start;
        for (net, prefix) in blocks {
            assert_eq!(net, expected);
            expected = net + (1u128 << (32 - prefix as u32));
        }
        assert_eq!(expected, end + 1);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        assert!(range_to_cidrs(10, 9, 32).is_empty());
    }
}
