//! Test doubles for [`MetricsSource`]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ExpositionDocument, MetricsSource, ReadError};

enum Behaviour {
    /// Pop scripted results; the last one repeats forever.
    Scripted(VecDeque<Option<String>>),
    /// Every call yields `acc_call <n>`.
    Counting,
}

/// In-memory source that records how it was called.
pub(crate) struct FakeSource {
    behaviour: Mutex<Behaviour>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSource {
    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour: Mutex::new(behaviour),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// `Some(text)` succeeds with `text`, `None` fails.
    pub(crate) fn scripted(script: Vec<Option<&str>>) -> Self {
        Self::with_behaviour(Behaviour::Scripted(
            script.into_iter().map(|s| s.map(str::to_string)).collect(),
        ))
    }

    pub(crate) fn ok(text: &str) -> Self {
        Self::scripted(vec![Some(text)])
    }

    pub(crate) fn failing() -> Self {
        Self::scripted(vec![None])
    }

    pub(crate) fn counting() -> Self {
        Self::with_behaviour(Behaviour::Counting)
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_result(&self, call: usize) -> Option<String> {
        let mut behaviour = self.behaviour.lock().unwrap();
        match &mut *behaviour {
            Behaviour::Counting => Some(format!("# TYPE acc_call gauge\nacc_call {}\n", call)),
            Behaviour::Scripted(script) if script.len() > 1 => script.pop_front().flatten(),
            Behaviour::Scripted(script) => script.front().cloned().flatten(),
        }
    }
}

#[async_trait]
impl MetricsSource for FakeSource {
    async fn fetch(&self) -> Result<ExpositionDocument, ReadError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.next_result(call);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
            .map(ExpositionDocument::from_text)
            .ok_or_else(|| ReadError::NoData {
                table: "ZMETRIC".to_string(),
            })
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}
