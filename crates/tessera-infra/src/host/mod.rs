// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Host controls that decide when a headless session ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::HostControl;

/// Stops once a shared flag is raised, e.g. from a Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct StopFlagHost {
    flag: Arc<AtomicBool>,
    cursor: Option<(f64, f64)>,
}

impl StopFlagHost {
    /// Creates a host with a fresh, lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing flag.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag, cursor: None }
    }

    /// A clone of the flag; storing `true` ends the session.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Reports a fixed cursor position to the render loop.
    pub fn with_cursor(mut self, x: f64, y: f64) -> Self {
        self.cursor = Some((x, y));
        self
    }
}

impl HostControl for StopFlagHost {
    fn should_stop(&mut self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn cursor_position(&self) -> Option<(f64, f64)> {
        self.cursor
    }
}

/// Stops after a fixed number of frames.
#[derive(Debug, Clone)]
pub struct FrameLimitHost {
    remaining: u64,
}

impl FrameLimitHost {
    /// Allows exactly `frames` frames.
    pub fn new(frames: u64) -> Self {
        Self { remaining: frames }
    }
}

impl HostControl for FrameLimitHost {
    fn should_stop(&mut self) -> bool {
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        false
    }
}

/// Stops once a wall-clock deadline passes.
#[derive(Debug, Clone)]
pub struct DeadlineHost {
    deadline: Option<Instant>,
}

impl DeadlineHost {
    /// Stops `duration` from now.
    pub fn after(duration: Duration) -> Self {
        // An unrepresentable deadline never arrives.
        Self {
            deadline: Instant::now().checked_add(duration),
        }
    }
}

impl HostControl for DeadlineHost {
    fn should_stop(&mut self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Stops as soon as any of its hosts asks to.
///
/// Every host is polled each frame so frame limits keep counting; the first
/// cursor reported wins.
#[derive(Default)]
pub struct AnyHost {
    hosts: Vec<Box<dyn HostControl + Send>>,
}

impl AnyHost {
    /// An empty combinator that never stops on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host.
    pub fn with(mut self, host: impl HostControl + Send + 'static) -> Self {
        self.hosts.push(Box::new(host));
        self
    }
}

impl std::fmt::Debug for AnyHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyHost")
            .field("hosts", &self.hosts.len())
            .finish()
    }
}

impl HostControl for AnyHost {
    fn should_stop(&mut self) -> bool {
        self.hosts
            .iter_mut()
            .fold(false, |stop, host| host.should_stop() || stop)
    }

    fn cursor_position(&self) -> Option<(f64, f64)> {
        self.hosts.iter().find_map(|host| host.cursor_position())
    }

    fn poll_events(&mut self) {
        for host in &mut self.hosts {
            host.poll_events();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_limit_allows_exact_count() {
        let mut host = FrameLimitHost::new(3);
        let allowed = (0..10).take_while(|_| !host.should_stop()).count();
        assert_eq!(allowed, 3);
        assert!(host.should_stop());
    }

    #[test]
    fn test_stop_flag_is_shared() {
        let mut host = StopFlagHost::new();
        let flag = host.flag();
        assert!(!host.should_stop());
        flag.store(true, Ordering::Relaxed);
        assert!(host.should_stop());
    }

    #[test]
    fn test_deadline_in_the_past_stops() {
        let mut host = DeadlineHost::after(Duration::ZERO);
        assert!(host.should_stop());
        assert!(!DeadlineHost::after(Duration::from_secs(3600)).should_stop());
    }

    #[test]
    fn test_any_host_polls_every_host() {
        let mut host = AnyHost::new()
            .with(FrameLimitHost::new(5))
            .with(FrameLimitHost::new(2))
            .with(StopFlagHost::new().with_cursor(10.0, 20.0));

        assert_eq!(host.cursor_position(), Some((10.0, 20.0)));
        assert!(!host.should_stop());
        assert!(!host.should_stop());
        assert!(host.should_stop());
        assert!(!AnyHost::new().should_stop());
    }
}
