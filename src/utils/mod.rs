//! Small numeric helpers shared across modules

/// Index of the first maximum of `values`, or `None` when empty.
///
/// Values that compare unordered (NaN) never replace the current best.
pub fn argmax<'a, T, I>(values: I) -> Option<usize>
where
    T: PartialOrd + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut best: Option<(usize, &T)> = None;
    for (idx, value) in values.into_iter().enumerate() {
        let replace = match best {
            None => true,
            Some((_, current)) => value > current,
        };
        if replace {
            best = Some((idx, value));
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_first_maximum() {
        assert_eq!(argmax(&[-1, 1, -1, 1]), Some(1));
        assert_eq!(argmax(&[0.2, 0.9, 0.5]), Some(1));
        assert_eq!(argmax(&[3.0, 3.0]), Some(0));
    }

    #[test]
    fn test_argmax_empty_and_nan() {
        assert_eq!(argmax::<f64, _>(&[]), None);
        assert_eq!(argmax(&[0.1, f64::NAN, 0.3]), Some(2));
    }
}
