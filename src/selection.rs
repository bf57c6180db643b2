//! Signal selection: reduce a batch to its single strongest actionable signal

use crate::signal::{SelectedSignal, Signal};

/// Pick the `Act` signal with the highest confidence.
///
/// Equal confidences keep the earliest signal in batch order. Returns `None`
/// when nothing in the batch asks for an action.
pub fn select_best<I>(signals: I) -> Option<SelectedSignal>
where
    I: IntoIterator<Item = Signal>,
{
    signals
        .into_iter()
        .filter_map(SelectedSignal::new)
        .fold(None, |best: Option<SelectedSignal>, candidate| match best {
            Some(current) if candidate.confidence <= current.confidence => Some(current),
            _ => Some(candidate),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Action, Direction};

    fn signal(id: &str, action: Action, confidence: f64) -> Signal {
        Signal {
            observation_id: id.to_string(),
            action,
            score: confidence,
            confidence,
            rationale: Vec::new(),
        }
    }

    const BUY: Action = Action::Act(Direction::Buy);

    #[test]
    fn test_empty_batch_selects_nothing() {
        assert!(select_best(Vec::new()).is_none());
    }

    #[test]
    fn test_all_suppressed_selects_nothing() {
        let signals = vec![
            signal("A", Action::Suppress, 0.2),
            signal("B", Action::Suppress, 0.1),
        ];
        assert!(select_best(signals).is_none());
    }

    #[test]
    fn test_first_seen_wins_ties() {
        let signals = vec![
            signal("A", BUY, 0.5),
            signal("B", BUY, 0.7),
            signal("C", BUY, 0.7),
        ];
        let best = select_best(signals).unwrap();
        assert_eq!(best.observation_id, "B");
    }

    #[test]
    fn test_suppressed_never_wins_even_when_stronger() {
        let signals = vec![
            signal("A", Action::Suppress, 0.29),
            signal("B", Action::Act(Direction::Sell), 0.31),
        ];
        let best = select_best(signals).unwrap();
        assert_eq!(best.observation_id, "B");
        assert_eq!(best.direction(), Direction::Sell);
    }

    #[test]
    fn test_selected_confidence_is_batch_maximum() {
        let confidences = [0.4, 2.5, 0.9, 2.4, 1.1];
        let signals: Vec<_> = confidences
            .iter()
            .enumerate()
            .map(|(i, c)| signal(&i.to_string(), BUY, *c))
            .collect();

        let best = select_best(signals).unwrap();
        assert_eq!(best.confidence, 2.5);
        assert_eq!(best.observation_id, "1");
    }
}
