//! GPU frame timing with a ring of `GL_TIME_ELAPSED` queries.

use gl::types::GLuint;
use gl_driver::GlDriver;
use tracing::{debug, trace};

/// Timer queries cycling through Idle, Started and Waiting.
///
/// At most one query is started at a time. Ended queries wait in the ring
/// until their result is available; [`pop`](Self::pop) collects them without
/// blocking, [`kick`](Self::kick) blocks only when every query is waiting.
#[derive(Debug)]
pub struct TimestampQueries {
    queries: Vec<GLuint>,
    read: usize,
    write: usize,
    waiting: usize,
    started: bool,
    accumulated_ms: f32,
}

impl TimestampQueries {
    pub fn create<D: GlDriver>(driver: &mut D, count: usize) -> Self {
        let queries: Vec<GLuint> = (0..count.max(1)).map(|_| driver.gen_query()).collect();
        debug!(count = queries.len(), "created timestamp queries");
        Self {
            queries,
            read: 0,
            write: 0,
            waiting: 0,
            started: false,
            accumulated_ms: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.queries.len()
    }

    pub fn in_flight(&self) -> usize {
        self.waiting + usize::from(self.started)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn accumulate(&mut self, elapsed_ns: u64) {
        self.accumulated_ms += (elapsed_ns as f64 / 1_000_000.0) as f32;
        self.read = (self.read + 1) % self.queries.len();
        self.waiting -= 1;
    }

    /// Start timing the next submission unless a query is already running.
    pub fn kick<D: GlDriver>(&mut self, driver: &mut D) {
        if self.started {
            return;
        }

        if self.waiting == self.queries.len() {
            let oldest = self.queries[self.read];
            let elapsed = driver.query_result_u64(oldest);
            trace!(query = oldest, elapsed, "drained timestamp query");
            self.accumulate(elapsed);
        }

        driver.begin_query(gl::TIME_ELAPSED, self.queries[self.write]);
        self.started = true;
    }

    /// Collect finished queries, then end the running one.
    pub fn pop<D: GlDriver>(&mut self, driver: &mut D) {
        while self.waiting > 0 {
            let oldest = self.queries[self.read];
            if !driver.query_result_available(oldest) {
                break;
            }
            let elapsed = driver.query_result_u64(oldest);
            self.accumulate(elapsed);
        }

        if self.started {
            driver.end_query(gl::TIME_ELAPSED);
            self.write = (self.write + 1) % self.queries.len();
            self.waiting += 1;
            self.started = false;
        }
    }

    /// Milliseconds collected since the previous call.
    pub fn take_accumulated(&mut self) -> f32 {
        std::mem::take(&mut self.accumulated_ms).max(0.0)
    }

    pub fn destroy<D: GlDriver>(&mut self, driver: &mut D) {
        if self.started {
            driver.end_query(gl::TIME_ELAPSED);
            self.started = false;
        }
        for query in self.queries.drain(..) {
            driver.delete_query(query);
        }
        self.waiting = 0;
        self.read = 0;
        self.write = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_driver::{GlCall, ObjectKind, RecordingDriver};
    use pretty_assertions::assert_eq;

    #[test]
    fn kick_starts_one_query() {
        let mut driver = RecordingDriver::new();
        let mut queries = TimestampQueries::create(&mut driver, 3);

        queries.kick(&mut driver);
        assert_eq!(queries.in_flight(), 1);
        queries.kick(&mut driver);
        assert_eq!(queries.in_flight(), 1);
        assert_eq!(
            driver.count_calls(|c| matches!(c, GlCall::BeginQuery { .. })),
            1
        );
    }

    #[test]
    fn unready_query_stays_in_flight() {
        let mut driver = RecordingDriver::new();
        let mut queries = TimestampQueries::create(&mut driver, 3);

        queries.kick(&mut driver);
        queries.pop(&mut driver);
        assert_eq!(queries.in_flight(), 1);

        // Nothing finished yet: polling again changes nothing.
        queries.pop(&mut driver);
        assert_eq!(queries.in_flight(), 1);
        assert_eq!(queries.take_accumulated(), 0.0);
    }

    #[test]
    fn finished_queries_accumulate_and_reset() {
        let mut driver = RecordingDriver::new();
        let mut queries = TimestampQueries::create(&mut driver, 3);

        queries.kick(&mut driver);
        queries.pop(&mut driver);
        queries.kick(&mut driver);
        queries.pop(&mut driver);
        driver.complete_queries(2_500_000);
        queries.pop(&mut driver);

        assert_eq!(queries.in_flight(), 0);
        assert_eq!(queries.take_accumulated(), 5.0);
        assert_eq!(queries.take_accumulated(), 0.0);
    }

    #[test]
    fn full_ring_drains_oldest_before_starting() {
        let mut driver = RecordingDriver::new();
        driver.set_blocking_query_ns(4_000_000);
        let mut queries = TimestampQueries::create(&mut driver, 2);

        for _ in 0..2 {
            queries.kick(&mut driver);
            queries.pop(&mut driver);
        }
        assert_eq!(queries.in_flight(), 2);

        queries.kick(&mut driver);
        assert_eq!(queries.in_flight(), 2);
        assert_eq!(queries.take_accumulated(), 4.0);
    }

    #[test]
    fn destroy_deletes_every_query() {
        let mut driver = RecordingDriver::new();
        let mut queries = TimestampQueries::create(&mut driver, 3);
        queries.kick(&mut driver);

        queries.destroy(&mut driver);
        assert_eq!(driver.live_count(ObjectKind::Query), 0);
        assert_eq!(queries.in_flight(), 0);
        assert_eq!(driver.calls().last(), Some(&GlCall::DeleteQuery(3)));
    }
}
