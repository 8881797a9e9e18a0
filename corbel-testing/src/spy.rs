// Call recording for handlers, guards and test doubles

use parking_lot::Mutex;
use std::sync::Arc;

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub args: Vec<String>,
}

/// Records calls in order.
///
/// Clones share the log, so a spy can be moved into a controller or guard
/// and inspected from the test afterwards.
#[derive(Debug, Clone, Default)]
pub struct Spy {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Spy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.record_with(name, Vec::<String>::new());
    }

    pub fn record_with<I, S>(&self, name: &str, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.calls.lock().push(Call {
            name: name.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        });
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.name == name).count()
    }

    pub fn was_called(&self, name: &str) -> bool {
        self.calls_to(name) > 0
    }

    /// Names of every recorded call, in order
    pub fn names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.name.clone()).collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn last(&self) -> Option<Call> {
        self.calls.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let spy = Spy::new();
        let shared = spy.clone();

        shared.record("guard");
        shared.record_with("handler", ["42", "x"]);

        assert_eq!(spy.call_count(), 2);
        assert_eq!(spy.names(), vec!["guard", "handler"]);
        assert!(spy.was_called("guard"));
        assert_eq!(spy.calls_to("middleware"), 0);
        assert_eq!(
            spy.last(),
            Some(Call {
                name: "handler".to_string(),
                args: vec!["42".to_string(), "x".to_string()],
            })
        );

        spy.clear();
        assert_eq!(shared.call_count(), 0);
    }
}
