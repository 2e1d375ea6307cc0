//! Liveness-check hook: a progress predicate consulted at every scheduling
//! point and nondeterministic choice point.

/// Monitor invoked after each scheduling step.
///
/// Returning a message fails the iteration as an assertion failure with that
/// text; the monitor is otherwise opaque to the scheduler.
pub trait LivenessMonitor: Send {
    fn check_at_scheduling_step(&mut self) -> Option<String>;

    /// Called between iterations.
    fn reset(&mut self) {}
}

/// Adapter wrapping a closure as a monitor.
pub struct MonitorFn<F>(pub F);

impl<F> LivenessMonitor for MonitorFn<F>
where
    F: FnMut() -> Option<String> + Send,
{
    fn check_at_scheduling_step(&mut self) -> Option<String> {
        (self.0)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_monitor_fires_once_budget_is_spent() {
        let mut steps = 0u32;
        let mut monitor = MonitorFn(move || {
            steps += 1;
            (steps > 3).then(|| "no progress after 3 steps".to_string())
        });
        assert!(monitor.check_at_scheduling_step().is_none());
        assert!(monitor.check_at_scheduling_step().is_none());
        assert!(monitor.check_at_scheduling_step().is_none());
        assert_eq!(
            monitor.check_at_scheduling_step().as_deref(),
            Some("no progress after 3 steps")
        );
    }
}
