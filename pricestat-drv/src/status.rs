use pricestat_lib::Snapshot;

pub type SWatchSender = tokio::sync::watch::Sender<Option<Snapshot>>;
pub type SWatchReceiver = tokio::sync::watch::Receiver<Option<Snapshot>>;

pub fn channel() -> (SWatchSender, SWatchReceiver) {
    tokio::sync::watch::channel(None)
}

/// Publish `new`, waking subscribers only if something changed.
pub fn publish(pub_state: &SWatchSender, new: Snapshot) -> bool {
    pub_state.send_if_modified(|old: &mut Option<Snapshot>| {
        if old.as_ref() == Some(&new) {
            false
        } else {
            *old = Some(new);
            true
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricestat_lib::{Band, PriceCeiling, PriceGate, ThermalController};

    fn snapshot(temp: f64) -> Snapshot {
        let gate = PriceGate::new(PriceCeiling::new(9.0).unwrap());
        let mut thermal = ThermalController::new(Band::new(22.1, 22.5).unwrap());
        thermal.evaluate(gate.verdict(), Some(temp));
        Snapshot::capture(&gate, &thermal)
    }

    #[test]
    fn only_changes_wake_subscribers() {
        let (tx, mut rx) = channel();
        assert!(publish(&tx, snapshot(21.0)));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!publish(&tx, snapshot(21.0)));
        assert!(!rx.has_changed().unwrap());

        assert!(publish(&tx, snapshot(21.5)));
        assert_eq!(rx.borrow().as_ref().map(|s| s.last_temp), Some(Some(21.5)));
    }
}
