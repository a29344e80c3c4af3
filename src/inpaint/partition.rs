//! Box ordering and endpoint partitioning

use crate::geometry::TextBox;

/// Sort boxes top-to-bottom, then left-to-right
///
/// The sort is stable so boxes sharing an origin keep their detector order;
/// repeated runs over the same input therefore group identically.
pub fn sort_reading_order(boxes: &mut [TextBox]) {
    boxes.sort_by_key(|b| (b.rect.y, b.rect.x));
}

/// Split `items` into `groups` contiguous runs of near-equal size
///
/// Sizes are `len / groups` or one more; the first `len % groups` runs take the
/// extra item. `groups == 0` is treated as 1.
pub fn partition_evenly<T: Clone>(items: &[T], groups: usize) -> Vec<Vec<T>> {
    let groups = groups.max(1);
    if groups == 1 {
        return vec![items.to_vec()];
    }

    let base = items.len() / groups;
    let rem = items.len() % groups;

    let mut out = Vec::with_capacity(groups);
    let mut start = 0;
    for i in 0..groups {
        let size = base + usize::from(i < rem);
        out.push(items[start..start + size].to_vec());
        start += size;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn test_five_over_two() {
        let items: Vec<u32> = (0..5).collect();
        let groups = partition_evenly(&items, 2);
        assert_eq!(groups, vec![vec![0, 1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_single_group() {
        let items = vec![1, 2, 3];
        assert_eq!(partition_evenly(&items, 1), vec![vec![1, 2, 3]]);
        assert_eq!(partition_evenly(&items, 0), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_more_groups_than_items() {
        let items = vec!['a', 'b'];
        let groups = partition_evenly(&items, 4);
        assert_eq!(groups, vec![vec!['a'], vec!['b'], vec![], vec![]]);
    }

    #[test]
    fn test_partition_properties() {
        for total in 0..40usize {
            let items: Vec<usize> = (0..total).collect();
            for n in 1..8usize {
                let groups = partition_evenly(&items, n);
                assert_eq!(groups.len(), n);

                let flat: Vec<usize> = groups.iter().flatten().copied().collect();
                assert_eq!(flat, items);

                let max = groups.iter().map(Vec::len).max().unwrap_or(0);
                let min = groups.iter().map(Vec::len).min().unwrap_or(0);
                assert!(max - min <= 1);

                // Deterministic
                assert_eq!(groups, partition_evenly(&items, n));
            }
        }
    }

    #[test]
    fn test_sort_reading_order() {
        let mut boxes = vec![
            TextBox::new(Rect::new(50, 10, 5, 5), "b", 1.0),
            TextBox::new(Rect::new(5, 40, 5, 5), "c", 1.0),
            TextBox::new(Rect::new(10, 10, 5, 5), "a", 1.0),
        ];
        sort_reading_order(&mut boxes);
        let texts: Vec<&str> = boxes.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }
}
